//! Weather desk example
//!
//! Registers two tools, answers one request with a scripted generator, and
//! prints the tool statuses and streamed answer. Runs offline.
//!
//! Set `OPENROUTER_API_KEY` and pass `--live` to stream from a real model.

use agenthub_core::prelude::*;
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn registry() -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(HandlerTool::new(
        ToolDescriptor::new("weather", "Current conditions for a city")
            .with_parameters(ParameterSchema::new().required("query", ParamType::String))
            .with_heuristic(KeywordHeuristic::new(["weather", "temperature", "rain"]))
            .with_cache_ttl(Duration::from_secs(120)),
        |params: Parameters, _cancel: CancellationToken| async move {
            let query = params["query"].as_str().unwrap_or_default().to_string();
            Ok::<_, ToolInvocationError>(json!({
                "query": query,
                "conditions": "light rain",
                "temperature_c": 9,
            }))
        },
    )))?;

    // Always too slow, to show a timed-out call turning into a diagnostic note
    registry.register(Arc::new(HandlerTool::new(
        ToolDescriptor::new("radar", "Precipitation radar imagery")
            .with_heuristic(KeywordHeuristic::new(["rain"]))
            .with_timeout(Duration::from_millis(200)),
        |_params: Parameters, cancel: CancellationToken| async move {
            cancel.cancelled().await;
            Err::<serde_json::Value, _>(ToolInvocationError::new("cancelled"))
        },
    )))?;

    Ok(registry)
}

#[tokio::main]
async fn main() -> Result<()> {
    agenthub_core::logging::init("info");

    println!("Weather Desk Example");
    println!("====================\n");

    let live = std::env::args().any(|arg| arg == "--live");
    let mut builder = Orchestrator::builder().registry(registry()?);
    builder = if live {
        builder.generator(Arc::new(OpenAICompatibleGenerator::new(GeneratorConfig::default())?))
    } else {
        builder.generator(Arc::new(
            StaticGenerator::from_text("Expect light rain in Bergen, around 9 degrees.")
                .with_delay(Duration::from_millis(40)),
        ))
    };
    let orchestrator = builder.build()?;

    let request = "Will it rain in Bergen today? What's the temperature?";
    let context = ConversationContext::new()
        .with_system("You are a concise weather assistant.")
        .with_user(request);
    let cancel = CancellationToken::new();

    let (context, results) = orchestrator
        .select_and_execute(request, context, Some(Duration::from_secs(5)), &cancel)
        .await?;

    for result in &results {
        println!("{} {:<8} {:?}", result.call_id, result.tool_id, result.status);
    }
    println!();

    let mut stream = orchestrator.stream_response(context, &cancel);
    while let Some(chunk) = stream.next().await {
        print!("{}", chunk?);
    }
    println!("\n\nStream finished: {:?}", stream.state());

    Ok(())
}
