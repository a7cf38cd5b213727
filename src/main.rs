use chatterbox_rust::client::{Client, ClientError};
use chatterbox_rust::config::ClientConfig;
use chatterbox_rust::store::IdentityStore;
use chatterbox_rust::types::message::MessageContent;
use chatterbox_rust_tokio_transport::TokioWebSocketTransportFactory;
use chatterbox_rust_ureq_http_client::UreqHttpClient;
use chrono::Local;
use clap::Parser;
use log::{error, info};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

// Terminal client for the ChatterBox chat server.
//
// Usage:
//   cargo run -- -u alice -p secret                 # log in and chat
//   cargo run -- -u alice -p secret --register      # create the account first
//   cargo run -- -p secret                          # reuse the remembered username
//
// Commands once connected:
//   /users                    list online users
//   /msg <user> <text>        send a text message
//   /file <user> <path>       send a file
//   /log <user>               show the conversation with a user
//   /call <user>              start a voice call
//   /accept | /reject         answer the ringing call
//   /end                      hang up the active call
//   /logout                   forget the remembered username and quit
//   /quit                     disconnect and exit

#[derive(Parser, Debug)]
#[command(name = "chatterbox", about = "Terminal client for the ChatterBox chat server")]
struct Args {
    /// WebSocket endpoint of the chat server
    #[arg(long, default_value = "ws://127.0.0.1:5000/ws")]
    server_url: String,

    /// Base URL of the HTTP login/registration API
    #[arg(long, default_value = "http://127.0.0.1:5000")]
    api_url: String,

    /// Account name; defaults to the remembered identity
    #[arg(short, long)]
    username: Option<String>,

    /// Account password
    #[arg(short, long)]
    password: String,

    /// Create the account before logging in
    #[arg(long)]
    register: bool,

    /// Where the logged-in username is remembered between runs
    #[arg(long, default_value = "chatterbox-identity.json")]
    identity_file: String,
}

fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime");

    rt.block_on(async {
        if let Err(e) = run(args).await {
            error!("{e:?}");
            std::process::exit(1);
        }
    });
}

async fn run(args: Args) -> anyhow::Result<()> {
    let identity_store = IdentityStore::new(&args.identity_file);
    let username = match args.username.clone().or(identity_store.load()?) {
        Some(username) => username,
        None => anyhow::bail!("no username given and none remembered; pass --username"),
    };

    let http_client = UreqHttpClient::new();
    if args.register {
        let response =
            chatterbox_rust::auth::register(&http_client, &args.api_url, &username, &args.password)
                .await?;
        if !response.success {
            anyhow::bail!("registration failed: {}", response.message);
        }
    }
    let response =
        chatterbox_rust::auth::login(&http_client, &args.api_url, &username, &args.password).await?;
    if !response.success {
        anyhow::bail!("login failed: {}", response.message);
    }
    identity_store.save(&username)?;

    let config = ClientConfig {
        server_url: args.server_url.clone(),
        ..Default::default()
    };
    let transport_factory = Arc::new(TokioWebSocketTransportFactory::new(&args.server_url));
    let client = Client::new(username.clone(), config, transport_factory);

    spawn_event_printer(&client);

    let run_client = client.clone();
    let run_task = tokio::spawn(async move { run_client.run().await });

    info!("Connected as {username}. Type /quit to exit.");
    repl(&client, &identity_store).await?;

    client.disconnect().await;
    let _ = run_task.await;
    Ok(())
}

/// Prints events from the bus so the terminal shows what's happening.
fn spawn_event_printer(client: &Arc<Client>) {
    let local_user = client.username().to_string();
    let mut presence = client.event_bus.presence.subscribe();
    let mut messages = client.event_bus.message.subscribe();
    let mut incoming = client.event_bus.incoming_call.subscribe();
    let mut call_state = client.event_bus.call_state.subscribe();
    let mut disconnected = client.event_bus.disconnected.subscribe();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                Ok(update) = presence.recv() => {
                    println!("* online: {}", update.online_users.join(", "));
                }
                Ok(received) = messages.recv() => {
                    match &received.message.content {
                        MessageContent::Text(body) => {
                            println!("[{}] {}", received.peer, body);
                        }
                        MessageContent::File(file) => {
                            println!(
                                "[{}] sent file {} ({} bytes)",
                                received.peer, file.file_name, file.file_size
                            );
                        }
                    }
                }
                Ok(call) = incoming.recv() => {
                    println!("* incoming call from {} (/accept or /reject)", call.caller);
                }
                Ok(update) = call_state.recv() => {
                    println!(
                        "* call with {}: {:?}",
                        update.call.other_party(&local_user),
                        update.phase
                    );
                }
                Ok(state) = disconnected.recv() => {
                    if state.will_retry {
                        println!("* connection lost, reconnecting...");
                    } else {
                        println!("* offline");
                    }
                }
                else => break,
            }
        }
    });
}

async fn repl(client: &Arc<Client>, identity_store: &IdentityStore) -> anyhow::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => break,
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, rest) = match line.split_once(' ') {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        let result = match command {
            "/quit" => break,
            "/logout" => {
                identity_store.clear()?;
                break;
            }
            "/users" => {
                let users = client.online_users().await;
                println!("online: {}", users.join(", "));
                client.request_online_users().await
            }
            "/msg" => match rest.split_once(' ') {
                Some((peer, text)) => client.send_message(peer, text).await,
                None => {
                    println!("usage: /msg <user> <text>");
                    Ok(())
                }
            },
            "/file" => match rest.split_once(' ') {
                Some((peer, path)) => match std::fs::read(path) {
                    Ok(data) => {
                        let file_name = std::path::Path::new(path)
                            .file_name()
                            .map(|name| name.to_string_lossy().into_owned())
                            .unwrap_or_else(|| path.to_string());
                        client.send_file(peer, &file_name, data.into()).await
                    }
                    Err(e) => {
                        println!("cannot read {path}: {e}");
                        Ok(())
                    }
                },
                None => {
                    println!("usage: /file <user> <path>");
                    Ok(())
                }
            },
            "/log" => {
                for message in client.messages_with(rest).await {
                    let direction = if message.sender == client.username() {
                        "me"
                    } else {
                        message.sender.as_str()
                    };
                    match &message.content {
                        MessageContent::Text(body) => println!("  {direction}: {body}"),
                        MessageContent::File(file) => {
                            println!("  {direction}: [file {}]", file.file_name)
                        }
                    }
                }
                Ok(())
            }
            "/call" => client.initiate_call(rest).await,
            "/accept" => match client.ringing_call().await {
                Some(call) => client.accept_call(&call.call_id).await,
                None => {
                    println!("no ringing call");
                    Ok(())
                }
            },
            "/reject" => match client.ringing_call().await {
                Some(call) => client.reject_call(&call.call_id).await,
                None => {
                    println!("no ringing call");
                    Ok(())
                }
            },
            "/end" => match client.active_call().await {
                Some(call) => client.end_call(&call.call_id).await,
                None => {
                    println!("no active call");
                    Ok(())
                }
            },
            _ => {
                println!("unknown command: {command}");
                Ok(())
            }
        };

        if let Err(e) = result {
            match e {
                ClientError::NotConnected => println!("not connected; message dropped"),
                other => println!("error: {other}"),
            }
        }
    }
    Ok(())
}
