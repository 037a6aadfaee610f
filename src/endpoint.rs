use std::borrow::Cow;

use reqwest::Method;
use serde::de::DeserializeOwned;

use crate::{decode::decode_json, Headers, Parameters, Result};

/// Typed description of one API call.
///
/// Only [`path`](Endpoint::path) is required. The defaults describe a
/// parameterless `GET` whose JSON body decodes into [`Endpoint::Response`].
///
/// ```
/// use std::borrow::Cow;
///
/// use courier_http::{Endpoint, Method};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// struct GetUser(u64);
///
/// impl Endpoint for GetUser {
///     type Response = User;
///
///     fn path(&self) -> Cow<'_, str> {
///         format!("/users/{}", self.0).into()
///     }
/// }
///
/// assert_eq!(GetUser(7).path(), "/users/7");
/// assert_eq!(GetUser(7).method(), Method::GET);
/// ```
pub trait Endpoint: Send + Sync + 'static {
    type Response: DeserializeOwned + Send + 'static;

    /// Path relative to the client base URL, or an absolute URL.
    fn path(&self) -> Cow<'_, str>;

    fn method(&self) -> Method {
        Method::GET
    }

    fn headers(&self) -> Headers {
        Headers::new()
    }

    fn parameters(&self) -> Result<Parameters> {
        Ok(Parameters::new())
    }

    fn decode(&self, body: &[u8]) -> Result<Self::Response> {
        decode_json(body)
    }
}
