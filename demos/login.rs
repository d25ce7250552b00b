//! Login example
//!
//! Logs in to an instance, fetches the front page with the returned token
//! and prints server pushes for a few seconds.
//!
//! Run with:
//! LINKWIRE_INSTANCE=lemmy.ml LINKWIRE_USER=me LINKWIRE_PASSWORD=secret \
//!     cargo run --example login

use linkwire::core::ObservabilityConfig;
use linkwire::{ClientBuilder, Operation, TransportEvent};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
struct Login {
    username_or_email: String,
    password: String,
}

#[derive(Deserialize)]
struct LoginResponse {
    jwt: String,
}

#[derive(Serialize)]
struct GetPosts {
    #[serde(rename = "type_")]
    listing_type: &'static str,
    sort: &'static str,
    page: u32,
    limit: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let instance = std::env::var("LINKWIRE_INSTANCE").unwrap_or_else(|_| "lemmy.ml".to_string());
    let user = std::env::var("LINKWIRE_USER")?;
    let password = std::env::var("LINKWIRE_PASSWORD")?;

    let client = ClientBuilder::new(instance)
        .with_observability(ObservabilityConfig::new("linkwire-login-demo"))
        .connect()
        .await?;

    let mut events = client.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                TransportEvent::Connected { endpoint } => tracing::info!(%endpoint, "Connected"),
                TransportEvent::Disconnected => tracing::warn!("Disconnected"),
                TransportEvent::Error(error) => tracing::warn!(%error, "Transport error"),
            }
        }
    });

    let login: LoginResponse = client
        .request(
            Operation::Login,
            Login {
                username_or_email: user,
                password,
            },
        )
        .await?;
    println!("Logged in");
    client.set_auth(Some(login.jwt)).await;

    let posts: serde_json::Value = client
        .request(
            Operation::GetPosts,
            GetPosts {
                listing_type: "All",
                sort: "Hot",
                page: 1,
                limit: 5,
            },
        )
        .await?;
    for post in posts["posts"].as_array().into_iter().flatten() {
        println!("- {}", post["name"].as_str().unwrap_or("<untitled>"));
    }

    let listener = client.on_unsolicited(Operation::CreatePost, |data| async move {
        println!("New post: {}", data["post"]["name"]);
    });
    tokio::time::sleep(Duration::from_secs(5)).await;
    listener.abort();

    client.close().await?;
    Ok(())
}
