use reqwest::{
    Method, Url,
    header::{HeaderMap, HeaderName, HeaderValue},
};

use crate::error::{AppError, AppResult, AttackError};

/// A fully validated request template shared by every hit of an attack.
#[derive(Debug, Clone)]
pub struct Target {
    pub(crate) method: Method,
    pub(crate) url: Url,
    pub(crate) headers: HeaderMap,
    pub(crate) body: String,
}

impl Target {
    /// Build a target from loosely typed request fields. An empty method
    /// means `GET`.
    ///
    /// # Errors
    ///
    /// Returns an error when the method, URL or a header is invalid.
    pub fn new(method: &str, url: &str, headers: &[(String, String)], body: String) -> AppResult<Self> {
        let method = parse_method(method)?;
        let url = Url::parse(url).map_err(|source| {
            AppError::attack(AttackError::InvalidUrl {
                url: url.to_owned(),
                source,
            })
        })?;

        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_err| {
                AppError::attack(AttackError::InvalidHeader { name: name.clone() })
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|_err| {
                AppError::attack(AttackError::InvalidHeader { name: name.clone() })
            })?;
            header_map.append(header_name, header_value);
        }

        Ok(Self {
            method,
            url,
            headers: header_map,
            body,
        })
    }

    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Size of the request body in bytes.
    #[must_use]
    pub fn body_len(&self) -> u64 {
        u64::try_from(self.body.len()).unwrap_or(u64::MAX)
    }
}

fn parse_method(method: &str) -> AppResult<Method> {
    let trimmed = method.trim();
    if trimmed.is_empty() {
        return Ok(Method::GET);
    }
    Method::from_bytes(trimmed.to_ascii_uppercase().as_bytes()).map_err(|_err| {
        AppError::attack(AttackError::InvalidMethod {
            method: method.to_owned(),
        })
    })
}
