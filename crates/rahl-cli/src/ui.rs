//! Terminal rendering for the Rahl CLI.

use colored::*;

use rahl_core::config::RahlConfig;
use rahl_core::message::ChatReply;

/// Card with a title line.
///
/// ```text
/// ╭─  Title ──────────────────────╮
/// │  line1                        │
/// ╰───────────────────────────────╯
/// ```
pub fn print_card(title: &str, lines: &[String], width: usize) {
    let inner = width - 2;

    let t = format!(" {} ", title);
    let dashes = inner.saturating_sub(t.chars().count() + 2);
    println!("{}", format!("╭─ {}{}╮", t, "─".repeat(dashes)).cyan());

    for line in lines {
        let padding = inner.saturating_sub(line.chars().count() + 2);
        println!("{}  {}{}{}", "│".cyan(), line, " ".repeat(padding), "│".cyan());
    }

    println!("{}", format!("╰{}╯", "─".repeat(inner)).cyan());
}

pub fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("{}", "    ╔══════════════════════════════════════╗".cyan());
    println!("{}", format!("    ║          ⚡ Rahl AI v{:<8}⚡       ║", version).cyan());
    println!("{}", "    ║   Chat, then build it 🦀             ║".cyan());
    println!("{}", "    ╚══════════════════════════════════════╝\n".cyan());
}

/// Startup card for `rahl serve`.
pub fn print_server_card(config: &RahlConfig) {
    let s = &config.server;
    let lines = vec![
        format!("Provider: {}", config.provider.provider),
        format!("Model:    {}", config.provider.model),
        format!("Endpoint: http://{}:{}", s.host, s.port),
        format!("Window:   {} turns", config.gateway.history_window),
        format!(
            "Static:   {}",
            s.static_dir
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_else(|| "-".to_string())
        ),
        format!(
            "GitHub:   {}",
            if config.github.client_id.is_some() { "enabled" } else { "disabled" }
        ),
    ];
    print_card("🌐 REST API Server", &lines, 52);

    println!();
    println!("  {}", "Endpoints:".bold());
    println!("    {} — Health check", "GET  /health".cyan());
    println!("    {} — Chat with the assistant", "POST /api/chat".cyan());
    println!("    {} — Session state", "GET  /api/session/{id}".cyan());
    println!("    {} — GitHub OAuth", "POST /api/github/auth".cyan());
    println!("    {} — Export to GitHub", "POST /api/github/create-repo".cyan());
    println!("    {} — Runtime metrics", "GET  /api/metrics".cyan());
    println!();
    println!(
        "    {}",
        format!(
            "curl -X POST http://{}:{}/api/chat -H 'Content-Type: application/json' -d '{{\"sessionId\": \"demo\", \"message\": \"hello\"}}'",
            s.host, s.port
        )
        .dimmed()
    );
    println!();
}

/// Print an assistant reply, code and generated files included.
pub fn print_reply(reply: &ChatReply) {
    let speaker = if reply.is_coding_mode {
        "Rahl [coding]".bright_green().bold()
    } else {
        "Rahl".bright_green().bold()
    };
    println!("{} {}", speaker, reply.message);

    if !reply.code.is_empty() {
        println!();
        println!("{}", "── code ──".dimmed());
        println!("{}", reply.code);
    }

    for (name, content) in &reply.files {
        println!();
        println!("{}", format!("── {} ({} bytes) ──", name, content.len()).dimmed());
    }
    println!();
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}
