//! Form handling demos: the same `Member` field read from the query string,
//! a urlencoded body and a multipart body.

use axum::{
    extract::{
        multipart::{Multipart, MultipartRejection},
        rejection::{FormRejection, QueryRejection},
        Form, Query,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
const MEMBER: &str = "Member";

/// Decoded form pairs in arrival order; repeated names are kept.
type FormPairs = Vec<(String, String)>;

/// First value of `Member`, as servlet-style `getParameter` would return.
fn first_member(pairs: &FormPairs) -> Option<&str> {
    pairs
        .iter()
        .find(|(name, _)| name == MEMBER)
        .map(|(_, value)| value.as_str())
}

fn got(handler: &str, member: &str) -> Response {
    format!("Got ({handler}) Member [{member}]\n").into_response()
}

fn not_valid() -> Response {
    (StatusCode::NOT_ACCEPTABLE, "Form not valid").into_response()
}

pub async fn query(form: Result<Query<FormPairs>, QueryRejection>) -> Response {
    match form {
        Ok(Query(pairs)) => match first_member(&pairs) {
            Some(member) => got("QueryHandler", member),
            None => not_valid(),
        },
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Query form rejected");
            not_valid()
        }
    }
}

pub async fn urlencoded(form: Result<Form<FormPairs>, FormRejection>) -> Response {
    match form {
        Ok(Form(pairs)) => match first_member(&pairs) {
            Some(member) => got("UrlEncodedFormHandler", member),
            None => not_valid(),
        },
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Urlencoded form rejected");
            not_valid()
        }
    }
}

pub async fn multipart(multipart: Result<Multipart, MultipartRejection>) -> Response {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Multipart form rejected");
            return not_valid();
        }
    };

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "Malformed multipart body");
                return not_valid();
            }
        };

        // Uploaded files are not form values; a blank filename is not a file.
        let is_file = field
            .file_name()
            .is_some_and(|name| !name.trim().is_empty());
        if is_file || field.name() != Some(MEMBER) {
            continue;
        }
        return match field.text().await {
            Ok(member) => got("MultipartFormHandler", &member),
            Err(e) => {
                tracing::debug!(error = %e, "Unreadable multipart field");
                not_valid()
            }
        };
    }

    not_valid()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request},
        routing::{get, post},
        Router,
    };
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/form/query", get(query))
            .route("/form/urlencoded", post(urlencoded))
            .route("/form/multipart", post(multipart))
    }

    async fn send(request: Request<Body>) -> (StatusCode, String) {
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn query_member() {
        let (status, body) = send(
            Request::get("/form/query?Member=alice")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Got (QueryHandler) Member [alice]\n");

        let (status, body) = send(Request::get("/form/query").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_ACCEPTABLE);
        assert_eq!(body, "Form not valid");
    }

    #[tokio::test]
    async fn repeated_member_uses_first_value() {
        let (status, body) = send(
            Request::get("/form/query?Member=a&Member=b")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Got (QueryHandler) Member [a]\n");

        let (status, body) = send(
            Request::post("/form/urlencoded")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("Member=first&Member=second"))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Got (UrlEncodedFormHandler) Member [first]\n");
    }

    #[tokio::test]
    async fn urlencoded_member() {
        let (status, body) = send(
            Request::post("/form/urlencoded")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("Member=bob&other=1"))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Got (UrlEncodedFormHandler) Member [bob]\n");

        let (status, _) = send(
            Request::post("/form/urlencoded")
                .header(header::CONTENT_TYPE, "text/plain")
                .body(Body::from("Member=bob"))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_ACCEPTABLE);
    }

    #[tokio::test]
    async fn multipart_member_skips_files() {
        let body = "--XYZ\r\n\
            Content-Disposition: form-data; name=\"Member\"; filename=\"member.txt\"\r\n\
            \r\n\
            from-file\r\n\
            --XYZ\r\n\
            Content-Disposition: form-data; name=\"Member\"\r\n\
            \r\n\
            carol\r\n\
            --XYZ--\r\n";
        let (status, text) = send(
            Request::post("/form/multipart")
                .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XYZ")
                .body(Body::from(body))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, "Got (MultipartFormHandler) Member [carol]\n");
    }

    #[tokio::test]
    async fn multipart_blank_filename_is_a_value() {
        let body = "--XYZ\r\n\
            Content-Disposition: form-data; name=\"Member\"; filename=\"\"\r\n\
            \r\n\
            zed\r\n\
            --XYZ--\r\n";
        let (status, text) = send(
            Request::post("/form/multipart")
                .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XYZ")
                .body(Body::from(body))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, "Got (MultipartFormHandler) Member [zed]\n");
    }

    #[tokio::test]
    async fn multipart_requires_multipart_content_type() {
        let (status, _) = send(
            Request::post("/form/multipart")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("Member=dave"))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_ACCEPTABLE);
    }
}
