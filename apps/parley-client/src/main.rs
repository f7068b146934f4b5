use std::io::{self, Write};
use std::time::Duration;

use tokio::io::AsyncBufReadExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parley_client::api::{self, AuthApi};
use parley_client::controller::{ControllerConfig, Event, SessionController};

fn prompt(label: &str) -> String {
    print!("{}: ", label);
    io::stdout().flush().unwrap();
    let mut input = String::new();
    io::stdin().read_line(&mut input).unwrap();
    input.trim().to_string()
}

fn print_message(message: &parley_common::ChatMessage) {
    let local = message.timestamp.with_timezone(&chrono::Local);
    println!(
        "[{}] {}: {}",
        local.format("%H:%M:%S"),
        message.username,
        message.content
    );
}

/// Render one event. Returns `true` when the session is over.
fn render(event: &Event) -> bool {
    match event {
        // Reconnection is quiet; the history replay announces success.
        Event::Connecting { .. } | Event::ConnectionLost | Event::Reconnecting { .. } => {}
        Event::Live => println!("* connected"),
        Event::History(messages) => {
            for message in messages {
                print_message(message);
            }
        }
        Event::Chat(message) => print_message(message),
        Event::System { content } => println!("* {}", content),
        Event::Presence { count } => println!("* {} online", count),
        Event::ServerError { message } => eprintln!("! {}", message),
        Event::SendFailed { reason } => eprintln!("! message not sent: {}", reason),
        Event::AuthRejected { message } => {
            eprintln!("! authentication failed: {}", message);
            return true;
        }
        Event::LoggedOut => {
            println!("* logged out");
            return true;
        }
    }
    false
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley_client=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let server_url = std::env::var("PARLEY_SERVER_URL")
        .unwrap_or_else(|_| "http://localhost:3000".to_string());
    let reconnect_ms: u64 = std::env::var("PARLEY_RECONNECT_DELAY_MS")
        .unwrap_or_else(|_| "5000".to_string())
        .parse()
        .expect("PARLEY_RECONNECT_DELAY_MS must be a number");

    println!("=== Parley ===\n");

    let choice = prompt("[l]ogin or [r]egister");
    let username = prompt("Username");
    print!("Password: ");
    io::stdout().flush().unwrap();
    let password = rpassword::read_password().expect("Failed to read password");

    let auth = AuthApi::new(&server_url);
    let result = match choice.as_str() {
        "r" | "register" => auth.register(&username, &password).await,
        _ => auth.login(&username, &password).await,
    };
    let token = match result {
        Ok(token) => token,
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    };

    println!("\nWelcome, {}. Type a message and press Enter; /quit to leave.\n", username);

    let config = ControllerConfig {
        ws_url: api::ws_url(&server_url),
        reconnect_delay: Duration::from_millis(reconnect_ms),
    };
    let (controller, mut events) = SessionController::spawn(config, token);

    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => {
                        if render(&event) {
                            break;
                        }
                    }
                    None => break,
                }
            }

            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        if line == "/quit" {
                            controller.logout();
                        } else {
                            controller.send(line);
                        }
                    }
                    // Closed stdin ends the session like /quit would.
                    Ok(None) | Err(_) => {
                        stdin_open = false;
                        controller.logout();
                    }
                }
            }
        }
    }

    controller.join().await;
}
