use std::borrow::Cow;

use courier_http::{ApiClient, Endpoint, Method, Parameters};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct Post {
    id: u64,
    title: String,
}

struct ListPosts {
    user_id: u64,
}

impl Endpoint for ListPosts {
    type Response = Vec<Post>;

    fn path(&self) -> Cow<'_, str> {
        "/posts".into()
    }

    fn parameters(&self) -> courier_http::Result<Parameters> {
        let mut parameters = Parameters::new();
        parameters.insert("userId".to_owned(), json!(self.user_id));
        Ok(parameters)
    }
}

struct CreatePost {
    title: String,
}

impl Endpoint for CreatePost {
    type Response = Post;

    fn path(&self) -> Cow<'_, str> {
        "/posts".into()
    }

    fn method(&self) -> Method {
        Method::POST
    }

    fn parameters(&self) -> courier_http::Result<Parameters> {
        let mut parameters = Parameters::new();
        parameters.insert("title".to_owned(), json!(self.title));
        Ok(parameters)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // COURIER_BASE_URL=https://jsonplaceholder.typicode.com works out of the box.
    let api = ApiClient::from_env().map_err(anyhow::Error::msg)?;

    let posts = api.send(ListPosts { user_id: 1 }).await?;
    for post in posts.iter().take(3) {
        println!("{}: {}", post.id, post.title);
    }

    let created = api
        .request(CreatePost {
            title: "hello".to_owned(),
        })
        .parameter("body", "sent with courier-http")
        .header("X-Demo", "basic")
        .run()
        .await?;
    println!("created post {} ({})", created.id, created.title);

    Ok(())
}
