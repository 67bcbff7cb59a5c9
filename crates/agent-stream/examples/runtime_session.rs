use agent_stream::prelude::*;
use agent_stream::{init_observability, invoke_all};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), AgentStreamError> {
    let _ = dotenvy::dotenv();
    init_observability();

    let client = HttpRuntimeClient::from_env()?;
    let user_id = "user0001";
    let session = RuntimeSessionId::generate(user_id, "runtime_session")?;

    let prompts = [
        "How much does a t3.micro cost per month?",
        "And with 50 GB of gp3 storage?",
    ];
    let report = invoke_all(&client, &session, user_id, &prompts, InvalidBytePolicy::Drop).await;

    let rendered = serde_json::to_string_pretty(&report)
        .map_err(|e| AgentStreamError::Protocol(format!("failed to render report: {e}")))?;
    println!("{rendered}");
    println!(
        "{}/{} invocations succeeded",
        report.succeeded(),
        report.total_invocations
    );
    Ok(())
}
