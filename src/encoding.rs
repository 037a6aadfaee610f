use reqwest::Method;

/// How request parameters are attached to the outgoing request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParameterEncoding {
    /// URL query string.
    Query,
    /// JSON request body.
    Json,
    /// `application/x-www-form-urlencoded` body.
    Form,
}

impl ParameterEncoding {
    /// Default encoding for a method: query string for GET, JSON otherwise.
    pub fn for_method(method: &Method) -> Self {
        if *method == Method::GET {
            Self::Query
        } else {
            Self::Json
        }
    }
}
