//! Router test helpers: an app without bearer auth, identity headers, and a
//! small seeded organization.

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use crewdesk_core::permissions::CATALOG;
use tower::ServiceExt;

use super::{build_app, AppState};
use crate::middleware::AuthState;

pub(crate) fn test_app(pool: sqlx::PgPool) -> Router {
    build_app(
        AppState {
            pool,
            page_size: 10,
        },
        AuthState::disabled(),
    )
}

/// Identity headers forwarded by the authentication front end.
#[derive(Debug, Clone)]
pub(crate) struct Caller(Vec<(&'static str, String)>);

impl Caller {
    pub(crate) fn admin() -> Self {
        Self(vec![("x-user-type", "admin".into()), ("x-user-id", "1".into())])
    }

    pub(crate) fn personnel(id: i64, company_id: i64) -> Self {
        Self(vec![
            ("x-user-type", "personnel".into()),
            ("x-user-id", id.to_string()),
            ("x-company-id", company_id.to_string()),
        ])
    }
}

pub(crate) async fn call(
    app: Router,
    method: Method,
    uri: &str,
    caller: Option<&Caller>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(caller) = caller {
        for (name, value) in &caller.0 {
            builder = builder.header(*name, value);
        }
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");

    let response = app.oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json parse")
    };
    (status, json)
}

/// Two companies; Acme has a CEO, a coach and a staff member, Globex has one
/// outsider. The CEO role holds every permission, the staff role none until
/// granted with [`grant`].
pub(crate) struct Org {
    pub company_id: i64,
    pub other_company_id: i64,
    pub staff_role_id: i64,
    pub ceo_id: i64,
    pub coach_id: i64,
    pub staff_id: i64,
    pub outsider_id: i64,
}

impl Org {
    pub(crate) fn ceo(&self) -> Caller {
        Caller::personnel(self.ceo_id, self.company_id)
    }

    pub(crate) fn coach(&self) -> Caller {
        Caller::personnel(self.coach_id, self.company_id)
    }

    pub(crate) fn staff(&self) -> Caller {
        Caller::personnel(self.staff_id, self.company_id)
    }

    pub(crate) fn outsider(&self) -> Caller {
        Caller::personnel(self.outsider_id, self.other_company_id)
    }
}

async fn insert_personnel(pool: &sqlx::PgPool, company_id: i64, role_id: i64, name: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO personnel (company_id, role_id, full_name, gender, email, mobile, username) \
         VALUES ($1, $2, $3, 'male', $4, '0000', $5) RETURNING id",
    )
    .bind(company_id)
    .bind(role_id)
    .bind(name)
    .bind(format!("{name}@example.com"))
    .bind(name.to_lowercase())
    .fetch_one(pool)
    .await
    .unwrap_or_else(|e| panic!("insert_personnel failed for '{name}': {e}"))
}

pub(crate) async fn seed_org(pool: &sqlx::PgPool) -> Org {
    for p in CATALOG {
        sqlx::query("INSERT INTO permissions (code, name, description) VALUES ($1, $2, $3)")
            .bind(p.code)
            .bind(p.name)
            .bind(p.description)
            .execute(pool)
            .await
            .expect("insert permission");
    }

    let company_id: i64 = sqlx::query_scalar("INSERT INTO companies (name) VALUES ('Acme') RETURNING id")
        .fetch_one(pool)
        .await
        .expect("insert company");
    let other_company_id: i64 =
        sqlx::query_scalar("INSERT INTO companies (name) VALUES ('Globex') RETURNING id")
            .fetch_one(pool)
            .await
            .expect("insert company");

    let ceo_role_id: i64 =
        sqlx::query_scalar("INSERT INTO roles (name, is_ceo) VALUES ('CEO', true) RETURNING id")
            .fetch_one(pool)
            .await
            .expect("insert role");
    sqlx::query(
        "INSERT INTO role_permissions (role_id, permission_id) SELECT $1, id FROM permissions",
    )
    .bind(ceo_role_id)
    .execute(pool)
    .await
    .expect("grant CEO permissions");
    let staff_role_id: i64 =
        sqlx::query_scalar("INSERT INTO roles (name) VALUES ('Staff') RETURNING id")
            .fetch_one(pool)
            .await
            .expect("insert role");

    Org {
        company_id,
        other_company_id,
        staff_role_id,
        ceo_id: insert_personnel(pool, company_id, ceo_role_id, "Ceo").await,
        coach_id: insert_personnel(pool, company_id, staff_role_id, "Coach").await,
        staff_id: insert_personnel(pool, company_id, staff_role_id, "Staff").await,
        outsider_id: insert_personnel(pool, other_company_id, staff_role_id, "Outsider").await,
    }
}

/// Add permission codes to a role.
pub(crate) async fn grant(pool: &sqlx::PgPool, role_id: i64, codes: &[&str]) {
    sqlx::query(
        "INSERT INTO role_permissions (role_id, permission_id) \
         SELECT $1, id FROM permissions WHERE code = ANY($2) \
         ON CONFLICT DO NOTHING",
    )
    .bind(role_id)
    .bind(codes.iter().map(|c| (*c).to_string()).collect::<Vec<_>>())
    .execute(pool)
    .await
    .expect("grant permissions");
}

/// Give `personnel_id` coach report visibility on `company_id`.
pub(crate) async fn grant_coach_access(pool: &sqlx::PgPool, company_id: i64, personnel_id: i64) {
    sqlx::query(
        "INSERT INTO coach_report_access (company_id, personnel_id, can_view) VALUES ($1, $2, true)",
    )
    .bind(company_id)
    .bind(personnel_id)
    .execute(pool)
    .await
    .expect("grant coach access");
}
