#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fichaje_lib::run().await
}
