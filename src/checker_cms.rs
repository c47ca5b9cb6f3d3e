use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::Url;
use serde_json::{json, Value};
use tracing::debug;

pub const LOGGED_IN_COOKIE_PREFIX: &str = "wordpress_logged_in";
pub const ADMIN_AREA_MARKER: &str = "wp-admin";
pub const DASHBOARD_MARKER: &str = "dashboard";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmsTarget {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl CmsTarget {
    fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    pub fn login_url(&self) -> String {
        format!("{}/wp-login.php", self.base_url())
    }

    pub fn admin_url(&self) -> String {
        format!("{}/{ADMIN_AREA_MARKER}/", self.base_url())
    }
}

/// What the login round trip ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginResponse {
    pub final_url: String,
    pub status_code: u16,
    pub cookie_names: Vec<String>,
    pub body: String,
}

impl LoginResponse {
    /// Any one signal is enough: landing in the admin area, holding the
    /// logged-in cookie, or seeing the dashboard.
    pub fn is_logged_in(&self) -> bool {
        self.final_url.contains(ADMIN_AREA_MARKER)
            || self
                .cookie_names
                .iter()
                .any(|name| name.starts_with(LOGGED_IN_COOKIE_PREFIX))
            || self.body.to_lowercase().contains(DASHBOARD_MARKER)
    }
}

pub trait LoginClient: Send + Sync {
    fn login(&self, target: &CmsTarget) -> Result<LoginResponse, String>;
}

/// Cookie-keeping HTTP client that drives the CMS login form.
#[derive(Debug, Clone)]
pub struct HttpLoginClient {
    timeout: Duration,
}

impl HttpLoginClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl LoginClient for HttpLoginClient {
    fn login(&self, target: &CmsTarget) -> Result<LoginResponse, String> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(jar.clone())
            .timeout(self.timeout)
            .build()
            .map_err(|error| format!("Failed to build HTTP client: {error}"))?;

        let login_url = target.login_url();
        client
            .get(&login_url)
            .send()
            .map_err(|error| error.to_string())?;

        let redirect_to = target.admin_url();
        let form = [
            ("log", target.username.as_str()),
            ("pwd", target.password.as_str()),
            ("wp-submit", "Log In"),
            ("redirect_to", redirect_to.as_str()),
            ("testcookie", "1"),
        ];
        let response = client
            .post(&login_url)
            .form(&form)
            .send()
            .map_err(|error| error.to_string())?;

        let final_url = response.url().clone();
        let status_code = response.status().as_u16();
        let mut cookie_names = Vec::new();
        for url in [Some(final_url.clone()), Url::parse(&login_url).ok()]
            .into_iter()
            .flatten()
        {
            for name in cookie_names_for(jar.as_ref(), &url) {
                if !cookie_names.contains(&name) {
                    cookie_names.push(name);
                }
            }
        }
        let body = response.text().map_err(|error| error.to_string())?;
        debug!(url = %final_url, status_code, cookies = cookie_names.len(), "cms login round trip finished");

        Ok(LoginResponse {
            final_url: final_url.to_string(),
            status_code,
            cookie_names,
            body,
        })
    }
}

fn cookie_names_for(jar: &Jar, url: &Url) -> Vec<String> {
    let Some(header) = jar.cookies(url) else {
        return Vec::new();
    };
    let Ok(text) = header.to_str() else {
        return Vec::new();
    };
    text.split(';')
        .filter_map(|pair| pair.split_once('='))
        .map(|(name, _)| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

pub fn check_cms_login(client: &dyn LoginClient, target: &CmsTarget) -> Value {
    let step = "Checking CMS WordPress Login";
    match client.login(target) {
        Ok(response) => {
            let success = response.is_logged_in();
            json!({
                "step": step,
                "status": success,
                "url": target.url,
                "username": target.username,
                "status_code": response.status_code,
                "final_url": response.final_url,
                "message": if success { None } else { Some("Login failed") },
            })
        }
        Err(error) => json!({
            "step": step,
            "status": "error",
            "url": target.url,
            "username": target.username,
            "status_code": Value::Null,
            "message": error,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{check_cms_login, CmsTarget, LoginResponse};
    use crate::test_support::FixedLoginClient;
    use serde_json::json;

    fn response(final_url: &str, cookies: &[&str], body: &str) -> LoginResponse {
        LoginResponse {
            final_url: final_url.to_string(),
            status_code: 200,
            cookie_names: cookies.iter().map(|name| name.to_string()).collect(),
            body: body.to_string(),
        }
    }

    fn target() -> CmsTarget {
        CmsTarget {
            url: "http://10.0.0.20/".into(),
            username: "admin".into(),
            password: "secret".into(),
        }
    }

    #[test]
    fn any_single_login_signal_is_enough() {
        assert!(response("http://x/wp-admin/", &[], "").is_logged_in());
        assert!(response("http://x/wp-login.php", &["wordpress_logged_in_9f1c"], "").is_logged_in());
        assert!(response("http://x/wp-login.php", &[], "<h1>Dashboard</h1>").is_logged_in());
        assert!(!response(
            "http://x/wp-login.php",
            &["wordpress_test_cookie"],
            "<div id=\"login_error\">incorrect password</div>"
        )
        .is_logged_in());
    }

    #[test]
    fn urls_are_built_from_trimmed_base() {
        assert_eq!(target().login_url(), "http://10.0.0.20/wp-login.php");
        assert_eq!(target().admin_url(), "http://10.0.0.20/wp-admin/");
    }

    #[test]
    fn transport_errors_become_errored_checks() {
        let client = FixedLoginClient::new(Err("error sending request for url".to_string()));
        let raw = check_cms_login(&client, &target());
        assert_eq!(raw["status"], json!("error"));
        assert_eq!(raw["message"], json!("error sending request for url"));

        let raw = check_cms_login(&FixedLoginClient::dashboard(), &target());
        assert_eq!(raw["status"], json!(true));
    }
}
