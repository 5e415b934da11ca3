//! HTML pages
//!
//! Every browser-facing outcome, including failures, is a confirm page served
//! with status 200. Failures are logged here before rendering.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::Response;
use tracing::error;

pub const ERROR_CLASS: &str = "alert is-error is-large is-text-center";
pub const SUCCESS_CLASS: &str = "alert is-success is-large is-text-center";

const TOP: &str = "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>datagate</title>\n</head>\n<body>\n";
const BOTTOM: &str = "</body>\n</html>\n";

/// Log `err` and render `msg` upper-cased on the error page
pub fn handle_error(msg: &str, err: &dyn std::fmt::Display) -> Response<Full<Bytes>> {
    error!(error = %err, "{}", msg);
    confirm_page(&msg.to_uppercase(), ERROR_CLASS)
}

pub fn success_page(msg: &str) -> Response<Full<Bytes>> {
    confirm_page(msg, SUCCESS_CLASS)
}

/// Page with a single message box
pub fn confirm_page(message: &str, class: &str) -> Response<Full<Bytes>> {
    let content = format!(
        "<div class=\"{}\">\n<pre>{}</pre>\n</div>\n",
        escape(class),
        escape(message)
    );
    html_response(content)
}

/// Password login form
pub fn login_page() -> Response<Full<Bytes>> {
    html_response(
        "<form method=\"post\" action=\"/login\">\n\
         <label>User <input type=\"text\" name=\"user\"></label>\n\
         <label>Password <input type=\"password\" name=\"password\"></label>\n\
         <button type=\"submit\">Login</button>\n\
         </form>\n"
            .to_string(),
    )
}

fn html_response(content: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(format!("{}{}{}", TOP, content, BOTTOM))));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
    response
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use hyper::StatusCode;

    async fn body_text(resp: Response<Full<Bytes>>) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_error_page_is_uppercase_and_ok() {
        let resp = handle_error("wrong user credentials", &"boom");
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_text(resp).await;
        assert!(body.contains("WRONG USER CREDENTIALS"));
        assert!(body.contains(ERROR_CLASS));
        assert!(!body.contains("boom"));
    }

    #[tokio::test]
    async fn test_success_page_escapes_message() {
        let body = body_text(success_page("logged in as <alice>")).await;
        assert!(body.contains("logged in as &lt;alice&gt;"));
        assert!(body.contains(SUCCESS_CLASS));
    }
}
