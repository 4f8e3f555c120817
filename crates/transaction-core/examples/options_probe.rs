//! Two transaction managers wired back-to-back over an in-memory
//! channel pair: one probes the other with OPTIONS and waits for the
//! transaction to complete.
//!
//! Run with: cargo run --example options_probe -p rtext-transaction-core

use std::sync::Arc;

use rtext_sip_core::{Method, RequestBuilder};
use rtext_sip_transport::MemoryChannel;
use rtext_transaction_core::{utils, TransactionEvent, TransactionManager};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("rtext_transaction_core=debug")
        .init();

    let client_addr = "127.0.0.1:5060".parse()?;
    let server_addr = "127.0.0.1:5070".parse()?;
    let ((client_ch, client_rx), (server_ch, server_rx)) =
        MemoryChannel::pair(client_addr, server_addr, false);

    let (client, _client_events) = TransactionManager::new(Arc::new(client_ch), client_rx);
    let (server, mut server_events) = TransactionManager::new(Arc::new(server_ch), server_rx);

    // Server side: answer every unmatched request with 200 OK
    tokio::spawn(async move {
        while let Some(event) = server_events.recv().await {
            if let TransactionEvent::RequestReceived { request, source } = event {
                let ok = utils::response_for(&request, 200, "OK", None)
                    .expect("request carried the mandatory headers");
                server
                    .start_server_non_invite(request, source, Some(ok))
                    .await
                    .expect("server transaction");
            }
        }
    });

    let request = RequestBuilder::new(Method::Options, "sip:server.local")
        .via("127.0.0.1:5060", "UDP", &utils::generate_branch())
        .from("Probe", "sip:probe@client.local", Some("p1"))
        .to("", "sip:server.local", None)
        .call_id("options-probe-1")
        .cseq(1)
        .max_forwards(70)
        .build();

    let handle = client
        .start_client_non_invite(request, server_addr, None)
        .await?;
    let outcome = handle.wait().await?;

    println!(
        "probe finished: {} (status {:?})",
        outcome.reason,
        outcome.final_response.map(|r| r.status)
    );
    Ok(())
}
