// Terminal chat client for the MoodTune relay
//
// Streams replies fragment by fragment the same way the web UI does.
// Commands: /regenerate, /clear, /quit. Ctrl+C while a reply is
// streaming stops just that reply.

use std::io::{self, BufRead, Write};

use moodtune::chat::{ChatSession, HttpTransport, StreamOutcome};

const DEFAULT_URL: &str = "http://127.0.0.1:8380";

fn print_fragment(fragment: &str) {
    print!("{}", fragment);
    let _ = io::stdout().flush();
}

async fn run_stream(session: &mut ChatSession<HttpTransport>, text: Option<&str>) {
    let handle = session.handle();
    let stop_on_ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.stop();
        }
    });

    let outcome = match text {
        Some(text) => session.send(text, print_fragment).await,
        None => session.regenerate(print_fragment).await,
    };
    stop_on_ctrl_c.abort();

    match outcome {
        StreamOutcome::Completed => println!(),
        StreamOutcome::Cancelled => println!("\n(stopped)"),
        StreamOutcome::SetupFailed | StreamOutcome::Failed => {
            // The error text was appended as its own chat entry
            if let Some(turn) = session.turns().last() {
                println!("{}", turn.content);
            }
        }
        StreamOutcome::NotStarted => println!("(nothing to regenerate)"),
    }
}

#[tokio::main]
async fn main() {
    let base_url = std::env::var("MOODTUNE_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let mut session = ChatSession::new(HttpTransport::new(&base_url));

    println!("Connected to {}", base_url);
    println!("Type a message, or /regenerate, /clear, /quit. Ctrl+C stops a streaming reply.");

    let stdin = io::stdin();
    loop {
        print!("> ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        match line.trim() {
            "" => continue,
            "/quit" => break,
            "/clear" => {
                session.clear();
                println!("(cleared)");
            }
            "/regenerate" => run_stream(&mut session, None).await,
            text => run_stream(&mut session, Some(text)).await,
        }
    }
}
