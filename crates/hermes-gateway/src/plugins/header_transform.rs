//! Response header rewriting: the post-proxy hook that applies gateway-
//! configured header additions, grounded on the header-rewriting mention
//! in `spec.md` §1's purpose statement.

#[derive(Debug, Clone, Default)]
pub struct HeaderTransformConfig {
    pub add_response_headers: Vec<(String, String)>,
}

impl HeaderTransformConfig {
    pub fn apply(&self, response: &mut actix_web::HttpResponse) {
        for (name, value) in &self.add_response_headers {
            if let (Ok(name), Ok(value)) = (
                actix_web::http::header::HeaderName::try_from(name.as_str()),
                actix_web::http::header::HeaderValue::try_from(value.as_str()),
            ) {
                response.headers_mut().insert(name, value);
            }
        }
    }
}
