use std::time::Duration;

use agent_stream::prelude::*;
use agent_stream::{init_observability, spawn_reconciler};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), AgentStreamError> {
    init_observability();

    let (tx, rx) = tokio::sync::mpsc::channel::<Result<StreamEvent, UpstreamError>>(8);
    tokio::spawn(async move {
        let mut snapshot = String::new();
        for word in ["The", " estimated", " monthly", " cost", " is", " $8.47."] {
            snapshot.push_str(word);
            if tx.send(Ok(StreamEvent::data(snapshot.clone()))).await.is_err() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    });

    let upstream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    });
    let mut stream = spawn_reconciler(upstream, ReconcileOptions::default())?;

    while let Some(event) = stream.next_event().await {
        match event {
            DeltaEvent::Delta(text) => print!("{text}"),
            DeltaEvent::Passthrough(value) => eprintln!("\n[event] {value}"),
            DeltaEvent::Error(failure) => eprintln!("\nstream error: {failure}"),
        }
    }

    let summary = stream.finish().await?;
    println!(
        "\n{} chunks, {} characters",
        summary.chunks, summary.characters
    );
    Ok(())
}
