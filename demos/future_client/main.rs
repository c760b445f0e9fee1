//! Future-flavor client demo: each call is prepared, then waited on.

#[path = "../common/mod.rs"]
mod common;

use std::time::Duration;

use minirpc::{FutureRpcClient, RpcController, Timeouts};

use common::{DiscardRequest, DiscardResponse, EchoRequest, EchoResponse};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let timeouts = Timeouts::uniform(Duration::from_secs(10));
    let mut client = FutureRpcClient::connect(common::server_addr(), timeouts).await?;

    let one = common::one_service_descriptor();
    let another = common::another_service_descriptor();
    let echo = one.find_method("Echo").expect("declared").clone();
    let discard = one.find_method("Discard").expect("declared").clone();
    let another_echo = another.find_method("Echo").expect("declared").clone();

    let controller = RpcController::new();
    let request = EchoRequest { message: "one echo from future client".into() };
    let mut response = EchoResponse::default();
    println!("future rpc client send one echo message '{}' to server", request.message);
    let pending = client.call_method(&echo, &controller, &request, None).await;
    pending.wait(&mut response).await;
    if controller.failed() {
        anyhow::bail!(
            "future rpc client call one echo message failed: {}",
            controller.error_text()
        );
    }
    println!("future rpc client receive one echo message '{}' from server", response.response);

    controller.reset();
    let request = DiscardRequest { message: "one discard from future client".into() };
    let mut discard_response = DiscardResponse::default();
    println!("future rpc client send one discard message '{}' to server", request.message);
    let pending = client.call_method(&discard, &controller, &request, None).await;
    pending.wait(&mut discard_response).await;
    if controller.failed() {
        anyhow::bail!(
            "future rpc client call one discard message failed: {}",
            controller.error_text()
        );
    }
    println!("future rpc client receive one discard message from server");

    controller.reset();
    let request = EchoRequest { message: "another echo from future client".into() };
    let mut response = EchoResponse::default();
    println!("future rpc client send another echo message '{}' to server", request.message);
    let pending = client.call_method(&another_echo, &controller, &request, None).await;
    pending.wait(&mut response).await;
    if controller.failed() {
        anyhow::bail!(
            "future rpc client call another echo message failed: {}",
            controller.error_text()
        );
    }
    println!("future rpc client receive another echo message '{}' from server", response.response);

    Ok(())
}
