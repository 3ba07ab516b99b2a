mod handle;
mod host;
mod relay;
mod sensor;
mod store;
mod supervisor;
#[cfg(test)]
mod testing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
