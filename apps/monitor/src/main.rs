use anyhow::{anyhow, Context, Result};
use clap::Parser;
use client_core::{
    load_settings, ClientBuilder, ClientEvent, ClientHandle, ProgressView, RegistryChange,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Follows the workers of an index server")]
struct Args {
    /// Overrides the server url from monitor.toml and APP__SERVER_URL.
    #[arg(long)]
    server_url: Option<String>,
    /// Message name carrying job progress. Repeatable.
    #[arg(long = "progress")]
    progress: Vec<String>,
    /// Runnable to toggle once it shows up, as `worker/runnable`.
    #[arg(long, value_parser = parse_target)]
    toggle: Option<Target>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    worker: String,
    runnable: String,
}

fn parse_target(raw: &str) -> Result<Target> {
    match raw.split_once('/') {
        Some((worker, runnable)) if !worker.is_empty() && !runnable.is_empty() => Ok(Target {
            worker: worker.to_string(),
            runnable: runnable.to_string(),
        }),
        _ => Err(anyhow!("expected worker/runnable, got {raw:?}")),
    }
}

fn render_progress(view: &ProgressView) -> String {
    let mut parts: Vec<String> = view
        .steps
        .iter()
        .map(|step| format!("{}[{} {}%]", step.label, step.state.class_name(), step.bar))
        .collect();
    parts.push(format!("end[{}]", view.terminal.class_name()));
    parts.join(" ")
}

fn log_change(change: &RegistryChange) {
    match change {
        RegistryChange::WorkerInserted { index, name } => {
            info!(worker = %name, index, "worker registered")
        }
        RegistryChange::WorkerRemoved { index, name } => {
            info!(worker = %name, index, "worker disconnected")
        }
        RegistryChange::RunnableInserted {
            worker,
            index,
            runnable,
        } => info!(
            worker = %worker,
            index,
            runnable = runnable.name(),
            state = runnable.toggle_class(),
            "runnable added"
        ),
        RegistryChange::RunnableRemoved {
            worker,
            index,
            name,
        } => info!(worker = %worker, index, runnable = %name, "runnable removed"),
        RegistryChange::RunnableStatusChanged {
            worker,
            name,
            status,
        } => info!(
            worker = %worker,
            runnable = %name,
            running = status.is_running(),
            "runnable status changed"
        ),
        RegistryChange::WorkerCountChanged {
            count,
            show_worker_names,
        } => info!(count, show_worker_names, "worker count changed"),
    }
}

/// Returns true once the toggle has been sent.
fn try_toggle(client: &ClientHandle, target: &Target, event: &ClientEvent) -> Result<bool> {
    let ClientEvent::Snapshot(registry) = event else {
        return Ok(false);
    };
    let Some(worker) = registry.worker(&target.worker) else {
        return Ok(false);
    };
    let Some(message) = worker.toggle_message(&target.runnable) else {
        return Ok(false);
    };
    info!(
        worker = %target.worker,
        runnable = %target.runnable,
        command = %message.name,
        "toggling runnable"
    );
    client.send(message)?;
    Ok(true)
}

fn handle_event(event: &ClientEvent) {
    match event {
        ClientEvent::Connected => info!("connected"),
        ClientEvent::Offline => warn!("connection lost, reconnecting"),
        ClientEvent::Welcome { name } => info!(name = %name, "welcomed by index"),
        ClientEvent::Registry(change) => log_change(change),
        ClientEvent::Snapshot(registry) => {
            info!(workers = registry.worker_count(), "registry updated")
        }
        ClientEvent::Progress { name, view, update } => info!(
            job = %name,
            rebuilt = update.rebuilt,
            completed = update.completed,
            "{}",
            render_progress(view)
        ),
        ClientEvent::JobFailed { name, error } => error!(job = %name, error = %error, "job failed"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let args = Args::parse();

    let mut settings = load_settings().context("failed to load settings")?;
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }

    let mut builder = ClientBuilder::new(settings);
    for name in args.progress {
        builder = builder.track_progress(name);
    }
    let mut events = builder.subscribe_events();
    let client = builder
        .connect()
        .await
        .context("failed to bootstrap client")?;
    let mut pending_toggle = args.toggle;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                client.shutdown()?;
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    handle_event(&event);
                    if let Some(target) = &pending_toggle {
                        if try_toggle(&client, target, &event)? {
                            pending_toggle = None;
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    client.closed().await;
    Ok(())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
