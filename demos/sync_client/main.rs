//! Blocking-flavor client demo against the echo server.

#[path = "../common/mod.rs"]
mod common;

use std::time::Duration;

use minirpc::{RpcController, SyncRpcClient, Timeouts};

use common::{DiscardRequest, DiscardResponse, EchoRequest, EchoResponse};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let timeouts = Timeouts::uniform(Duration::from_secs(10));
    let mut client = SyncRpcClient::connect(common::server_addr(), timeouts).await?;

    let one = common::one_service_descriptor();
    let another = common::another_service_descriptor();
    let echo = one.find_method("Echo").expect("declared").clone();
    let discard = one.find_method("Discard").expect("declared").clone();
    let another_echo = another.find_method("Echo").expect("declared").clone();

    let controller = RpcController::new();
    let request = EchoRequest { message: "one echo from sync client".into() };
    let mut response = EchoResponse::default();
    println!("sync rpc client send one echo message '{}' to server", request.message);
    client.call_method(&echo, &controller, &request, &mut response, None).await;
    if controller.failed() {
        anyhow::bail!("sync rpc client call one echo message failed: {}", controller.error_text());
    }
    println!("sync rpc client receive one echo message '{}' from server", response.response);

    controller.reset();
    let request = DiscardRequest { message: "one discard from sync client".into() };
    let mut discard_response = DiscardResponse::default();
    println!("sync rpc client send one discard message '{}' to server", request.message);
    client.call_method(&discard, &controller, &request, &mut discard_response, None).await;
    if controller.failed() {
        anyhow::bail!(
            "sync rpc client call one discard message failed: {}",
            controller.error_text()
        );
    }
    println!("sync rpc client receive one discard message from server");

    controller.reset();
    let request = EchoRequest { message: "another echo from sync client".into() };
    let mut response = EchoResponse::default();
    println!("sync rpc client send another echo message '{}' to server", request.message);
    client.call_method(&another_echo, &controller, &request, &mut response, None).await;
    if controller.failed() {
        anyhow::bail!(
            "sync rpc client call another echo message failed: {}",
            controller.error_text()
        );
    }
    println!("sync rpc client receive another echo message '{}' from server", response.response);

    Ok(())
}
