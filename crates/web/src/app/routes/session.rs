use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::{Extension, Query},
    http::{HeaderMap, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use chrono::Utc;
use serde_json::{Value, json};

use basis_auth::AuthContext;
use basis_auth::group::GROUP_SYSTEM;

use crate::app::dto::{self, LoginForm, NoParams, RedirectQuery, RpcRequest};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::SessionContext;
use crate::middleware::{session_clear_cookie, session_cookie, session_set_cookie};

/// Login, logout and the client shell; reachable without a session.
pub fn public_router() -> Router {
    Router::new()
        .route("/web", get(home))
        .route("/web/login", get(login_page).post(login))
        .route("/web/session/logout", get(logout))
}

pub async fn login_page(Query(query): Query<RedirectQuery>) -> Html<String> {
    Html(render_login(None, query.redirect.as_deref()))
}

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Response {
    let ctx = AuthContext {
        remote_addr: header_text(&headers, "x-forwarded-for"),
        user_agent: header_text(&headers, header::USER_AGENT.as_str()),
    };
    match services.login(form.login.trim(), &form.password, &ctx) {
        Ok((sid, _uid)) => {
            let target = dto::safe_redirect(form.redirect.as_deref());
            (
                [(header::SET_COOKIE, session_set_cookie(&sid))],
                Redirect::to(&target),
            )
                .into_response()
        }
        Err(_) => Html(render_login(Some("Wrong login/password"), form.redirect.as_deref())).into_response(),
    }
}

pub async fn logout(Extension(services): Extension<Arc<AppServices>>, headers: HeaderMap) -> Response {
    if let Some(sid) = session_cookie(&headers) {
        services.sessions.close(sid);
    }
    (
        [(header::SET_COOKIE, session_clear_cookie())],
        Redirect::to("/web/login"),
    )
        .into_response()
}

/// Client shell; sends visitors without a session to the login page.
pub async fn home(Extension(services): Extension<Arc<AppServices>>, headers: HeaderMap) -> Response {
    let claims = session_cookie(&headers).and_then(|sid| services.sessions.resolve(sid, Utc::now()));
    let Some(claims) = claims else {
        return Redirect::to("/web/login?redirect=/web").into_response();
    };
    let info = session_info(&services, claims.uid);
    Html(format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Basis</title></head>\n\
         <body><div id=\"app\"></div>\n<script>window.session_info = {};</script>\n\
         <script src=\"/web/static/app.js\"></script></body></html>",
        escape_script(&info.to_string())
    ))
    .into_response()
}

pub async fn get_session_info(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<SessionContext>,
    Json(request): Json<RpcRequest<Option<NoParams>>>,
) -> Response {
    errors::rpc_result(request.id, session_info(&services, session.uid()))
}

fn session_info(services: &AppServices, uid: basis_core::RecordId) -> Value {
    let models = &services.models;
    let Ok(user) = models.users.get(uid) else {
        return json!({ "uid": Value::Null });
    };
    let companies: Vec<Value> = user
        .company_ids
        .iter()
        .filter_map(|id| models.companies.get(*id).ok())
        .map(|c| json!([c.id, c.name]))
        .collect();
    let company = user
        .company_id
        .and_then(|id| models.companies.get(id).ok())
        .map(|c| json!({ "id": c.id, "name": c.name }))
        .unwrap_or(Value::Null);
    let groups: Vec<String> = models
        .security
        .groups_of(uid)
        .iter()
        .map(|g| g.as_str().to_string())
        .collect();
    json!({
        "uid": user.id,
        "name": user.name,
        "username": user.login,
        "partner_id": user.partner_id,
        "company_id": user.company_id,
        "company": company,
        "user_companies": companies,
        "user_context": user.context(),
        "groups": groups,
        "is_admin": models.security.has_group(uid, &GROUP_SYSTEM),
        "home_action_id": user.action_id,
        "server_version": env!("CARGO_PKG_VERSION"),
    })
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn render_login(error: Option<&str>, redirect: Option<&str>) -> String {
    let error = error
        .map(|e| format!("<p class=\"alert alert-danger\">{}</p>\n", escape_html(e)))
        .unwrap_or_default();
    let redirect = escape_html(&dto::safe_redirect(redirect));
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Login</title></head>\n<body>\n\
         <form method=\"post\" action=\"/web/login\">\n{error}\
         <label>Login <input type=\"text\" name=\"login\" required autofocus></label>\n\
         <label>Password <input type=\"password\" name=\"password\" required></label>\n\
         <input type=\"hidden\" name=\"redirect\" value=\"{redirect}\">\n\
         <button type=\"submit\">Log in</button>\n</form>\n</body></html>"
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
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

/// JSON embedded in a `<script>` must not close the tag.
fn escape_script(json: &str) -> String {
    json.replace("</", "<\\/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_page_escapes_its_inputs() {
        let page = render_login(Some("<b>bad</b>"), Some("/web?a=\"x\""));
        assert!(page.contains("&lt;b&gt;bad&lt;/b&gt;"));
        assert!(page.contains("value=\"/web?a=&quot;x&quot;\""));
        assert!(!page.contains("<b>bad"));
    }

    #[test]
    fn scripts_cannot_be_closed_from_json() {
        assert_eq!(escape_script(r#"{"n":"</script>"}"#), r#"{"n":"<\/script>"}"#);
    }
}
