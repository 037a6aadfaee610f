use std::{borrow::Cow, time::Duration};

use courier_http::{ApiClient, Endpoint, Mock, RetryPolicy};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct User {
    id: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct Todo {
    id: u64,
    completed: bool,
}

struct GetUser(u64);

impl Endpoint for GetUser {
    type Response = User;

    fn path(&self) -> Cow<'_, str> {
        format!("/users/{}", self.0).into()
    }
}

struct GetTodo(u64);

impl Endpoint for GetTodo {
    type Response = Todo;

    fn path(&self) -> Cow<'_, str> {
        format!("/todos/{}", self.0).into()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let api = ApiClient::from_env().map_err(anyhow::Error::msg)?;

    let users = api.batch([GetUser(1), GetUser(2), GetUser(3)]).await?;
    for user in &users {
        println!("user {}: {}", user.id, user.name);
    }

    let (user, todo) = api.batch2(GetUser(4), GetTodo(1)).await?;
    println!("{} has todo {} (completed: {})", user.name, todo.id, todo.completed);

    let offline = std::env::var_os("COURIER_OFFLINE").is_some();
    let mocked = api
        .request(GetUser(99))
        .mock_if(offline, Mock::success(r#"{"id":99,"name":"Offline"}"#))
        .retry(RetryPolicy::exponential(
            3,
            Duration::from_millis(200),
            2.0,
            Duration::from_secs(2),
        ))
        .run()
        .await?;
    println!("user {}: {}", mocked.id, mocked.name);

    Ok(())
}
