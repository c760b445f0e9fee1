//! Echo server demo: registers two services and serves until interrupted.

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;

use minirpc::RpcServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(std::io::stderr)
        .init();

    let mut server = RpcServer::loopback(common::SERVER_PORT, "echo-server");
    server.register_service(Arc::new(common::OneServiceImpl::new()));
    server.register_service(Arc::new(common::AnotherServiceImpl::new()));
    server.start().await?;
    println!("echo server listening on {}", server.local_addr().expect("bound address"));

    tokio::signal::ctrl_c().await?;
    server.stop().await;
    Ok(())
}
