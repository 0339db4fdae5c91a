//! Scripted push example
//!
//! This example pushes a configuration snippet in canary mode to a handful
//! of emulated routers. No network is involved: every device session runs
//! against a [`ScriptedChannel`], and one router is scripted to refuse the
//! connection so the failure summary has something to show.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example scripted_push
//! ```
//!
//! Set `RUST_LOG=debug` to watch the workers.

use std::time::Duration;

use ferrispush::device::shell_factory;
use ferrispush::{
    BatchConfig, BatchPayload, ScriptedChannel, ScriptedClient, ShellProfile, VendorRegistry,
    push_batch,
};
use secrecy::SecretString;

const CONFIG: &str = "hostname edge\ninterface bogus\n";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let profile = ShellProfile::new("emulated", r"[\w.-]+(\(config\))?#\s*$")?
        .with_config_mode("configure terminal", "end")
        .with_commit("commit")
        .with_canary("abort")
        .with_failure_pattern("% Invalid input")
        .with_timeout(Duration::from_secs(2));

    let mut registry = VendorRegistry::new();
    registry.register_factory("emulated", shell_factory(profile, emulated_router))?;

    let config = BatchConfig {
        targets: ["edge1", "edge2", "edge3", "core1"]
            .into_iter()
            .map(String::from)
            .collect(),
        vendor: "emulated".into(),
        user: Some("netops".into()),
        workers: 2,
        canary: true,
        verbose: true,
        ..Default::default()
    };

    println!("=== Ferrispush Scripted Push Example ===\n");

    let mut report = push_batch(
        &config,
        BatchPayload::Config(CONFIG.into()),
        &registry,
        SecretString::from("secret".to_string()),
    )
    .await?;
    report.sort();

    print!("{}", report.render("canary", config.verbose));
    Ok(())
}

/// Emulated router: `edge3` is unreachable, `core1` rejects the interface.
fn emulated_router(host: &str) -> ScriptedClient {
    if host == "edge3" {
        return ScriptedClient::refusing("no route to host");
    }

    let interface_reply = if host.starts_with("core") {
        format!("% Invalid input detected\n{host}(config)# ")
    } else {
        format!("{host}(config)# ")
    };

    let channel = ScriptedChannel::builder()
        .logged_in(format!("Welcome to {host}\n{host}# "))
        .rule("configure terminal", format!("{host}(config)# "))
        .rule("hostname", format!("{host}(config)# "))
        .rule("interface", interface_reply)
        .rule("abort", format!("{host}(config)# "))
        .rule("end", format!("{host}# "))
        .rule("exit", "")
        .build();

    match channel {
        Ok(channel) => ScriptedClient::new(channel),
        Err(e) => ScriptedClient::refusing(e.to_string()),
    }
}
