#[tokio::main]
async fn main() -> anyhow::Result<()> {
    roofline_lib::run().await
}
