#![no_main]

use std::sync::LazyLock;

use libfuzzer_sys::fuzz_target;

use slashgate::auth::{verify_signature, Credentials};
use slashgate::commands::{handle_inbound, parse_form_fields, CommandRegistry, InboundRequest, Reply};
use slashgate::config::CommandsConfig;

const NOW: i64 = 1_700_000_000;
const SECRET: &str = "fuzz-signing-secret";

static CONFIG: LazyLock<CommandsConfig> = LazyLock::new(|| {
    CommandsConfig::with_credentials(
        Credentials::default()
            .with_token("fuzz-token", "svc")
            .with_secret("svc", SECRET),
    )
});

static REGISTRY: LazyLock<CommandRegistry> = LazyLock::new(|| {
    let registry = CommandRegistry::new();
    registry.on_command("echo", |cmd, _| {
        cmd.mark_handled();
        Reply::text(cmd.text().to_string())
    });
    registry.on_any_help(|cmd, terms| {
        cmd.add_help([terms.to_string()], "fuzz help");
    });
    registry
});

// Input layout: [selector byte][signature bytes up to first 0x00][body].
fuzz_target!(|data: &[u8]| {
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };
    let (signature, body) = match rest.iter().position(|b| *b == 0) {
        Some(idx) => (&rest[..idx], &rest[idx + 1..]),
        None => (&[][..], rest),
    };
    let signature = String::from_utf8_lossy(signature).into_owned();
    let timestamp = NOW.to_string();

    let _ = parse_form_fields(body);
    let _ = verify_signature(SECRET, &timestamp, &signature, body);

    let request = InboundRequest {
        service_id: "svc".to_string(),
        auth_method: if selector & 1 == 0 { "token" } else { "sig" }.to_string(),
        timestamp: Some(timestamp),
        signature: Some(signature),
        body: body.to_vec(),
        query: None,
        now: NOW,
    };
    let _ = handle_inbound(&CONFIG, &REGISTRY, &request);
});
