//! Callback-flavor client demo: calls resolve on the client's executor.

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;
use std::time::Duration;

use minirpc::{AsyncRpcClient, Executor, RpcController, Timeouts};

use common::{DiscardRequest, DiscardResponse, EchoRequest, EchoResponse};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let executor = Executor::start(1);
    let timeouts = Timeouts::uniform(Duration::from_secs(10));
    let mut client = AsyncRpcClient::connect(&executor, common::server_addr(), timeouts).await?;

    let one = common::one_service_descriptor();
    let another = common::another_service_descriptor();
    let echo = one.find_method("Echo").expect("declared").clone();
    let discard = one.find_method("Discard").expect("declared").clone();
    let another_echo = another.find_method("Echo").expect("declared").clone();

    let controller = Arc::new(RpcController::new());
    let request = EchoRequest { message: "one echo from async client".into() };
    println!("async rpc client send one echo message '{}' to server", request.message);
    client.call_method(&echo, Arc::clone(&controller), &request, |response: EchoResponse| {
        println!(
            "async rpc client receive one echo message '{}' from server",
            response.response
        );
    });
    client.wait().await;
    if controller.failed() {
        anyhow::bail!(
            "async rpc client call one echo message failed: {}",
            controller.error_text()
        );
    }

    controller.reset();
    let request = DiscardRequest { message: "one discard from async client".into() };
    println!("async rpc client send one discard message '{}' to server", request.message);
    client.call_method(&discard, Arc::clone(&controller), &request, |_: DiscardResponse| {
        println!("async rpc client receive one discard message from server");
    });
    client.wait().await;
    if controller.failed() {
        anyhow::bail!(
            "async rpc client call one discard message failed: {}",
            controller.error_text()
        );
    }

    controller.reset();
    let request = EchoRequest { message: "another echo from async client".into() };
    println!("async rpc client send another echo message '{}' to server", request.message);
    client.call_method(&another_echo, Arc::clone(&controller), &request, |response: EchoResponse| {
        println!(
            "async rpc client receive another echo message '{}' from server",
            response.response
        );
    });
    client.wait().await;
    if controller.failed() {
        anyhow::bail!(
            "async rpc client call another echo message failed: {}",
            controller.error_text()
        );
    }

    executor.stop().await;
    Ok(())
}
