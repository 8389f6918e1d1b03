//! Request identity and the single capability check every handler goes through.
//!
//! Identity arrives from the upstream authentication module; this module only
//! reads it. Capabilities for personnel (role permissions, CEO flag, coach
//! report grants) are loaded per request by the caller and passed in.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::permissions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Admin,
    Personnel,
}

impl std::str::FromStr for UserType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "personnel" => Ok(Self::Personnel),
            other => Err(format!("unknown user type '{other}'")),
        }
    }
}

/// Who is calling. `company_id` is always present for personnel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_type: UserType,
    pub user_id: i64,
    pub company_id: Option<i64>,
}

impl Identity {
    #[must_use]
    pub fn admin(user_id: i64, company_id: Option<i64>) -> Self {
        Self {
            user_type: UserType::Admin,
            user_id,
            company_id,
        }
    }

    #[must_use]
    pub fn personnel(user_id: i64, company_id: i64) -> Self {
        Self {
            user_type: UserType::Personnel,
            user_id,
            company_id: Some(company_id),
        }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.user_type == UserType::Admin
    }

    /// The personnel id of the caller, or `None` for administrators.
    #[must_use]
    pub fn personnel_id(&self) -> Option<i64> {
        match self.user_type {
            UserType::Personnel => Some(self.user_id),
            UserType::Admin => None,
        }
    }
}

/// Request-scoped context handed to every component call.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub identity: Identity,
    pub capabilities: Capabilities,
}

/// What a personnel caller is allowed to do beyond their own records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub is_ceo: bool,
    permissions: HashSet<String>,
    coach_report_companies: HashSet<i64>,
}

impl Capabilities {
    pub fn new(
        is_ceo: bool,
        permissions: impl IntoIterator<Item = String>,
        coach_report_companies: impl IntoIterator<Item = i64>,
    ) -> Self {
        Self {
            is_ceo,
            permissions: permissions.into_iter().collect(),
            coach_report_companies: coach_report_companies.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn has_permission(&self, code: &str) -> bool {
        self.permissions.contains(code)
    }

    /// Whether a `coach_report_access` grant with `can_view` exists for `company_id`.
    #[must_use]
    pub fn has_coach_report_grant(&self, company_id: i64) -> bool {
        self.coach_report_companies.contains(&company_id)
    }

    #[must_use]
    pub fn coach_report_companies(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.coach_report_companies.iter().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action<'a> {
    /// Generic permission-code gated action.
    Permission(&'a str),
    ListCoachReports,
    ViewCoachReport,
    CreateCoachReport,
    EditCoachReport,
    DeleteCoachReport,
    ManageCoachReportAccess,
}

/// The company a record belongs to and, where relevant, its author.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceOwner {
    pub company_id: i64,
    pub author_id: Option<i64>,
}

impl ResourceOwner {
    #[must_use]
    pub fn company(company_id: i64) -> Self {
        Self {
            company_id,
            author_id: None,
        }
    }

    #[must_use]
    pub fn authored(company_id: i64, author_id: i64) -> Self {
        Self {
            company_id,
            author_id: Some(author_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("missing permission '{0}'")]
    MissingPermission(String),

    #[error("no coach report access for company {0}")]
    NoCoachReportGrant(i64),

    #[error("only the author or an administrator may modify this coach report")]
    NotAuthor,

    #[error("administrator access required")]
    AdminOnly,

    #[error("record belongs to another company")]
    OutsideCompany,
}

/// Decide whether `identity` may perform `action` on a record owned by `owner`.
///
/// Administrators may do everything. Personnel rules:
/// - `Permission(code)`: the role grants `code`, and the record (if any) is in
///   the caller's company.
/// - `ListCoachReports`: a grant row exists for the target company (the caller's
///   own company when `owner` is `None`).
/// - `ViewCoachReport`: the caller authored the report, or holds
///   `view_coach_reports` and a grant row for the report's company.
/// - `CreateCoachReport`: `add_coach_report`, targeting the caller's company or
///   one they hold a grant for.
/// - `EditCoachReport` / `DeleteCoachReport`: the caller authored the report.
/// - `ManageCoachReportAccess`: administrators only.
///
/// # Errors
///
/// Returns the [`AccessError`] describing the first unmet requirement.
pub fn authorize(
    identity: &Identity,
    capabilities: &Capabilities,
    action: Action<'_>,
    owner: Option<&ResourceOwner>,
) -> Result<(), AccessError> {
    if identity.is_admin() {
        return Ok(());
    }

    let is_author = owner
        .and_then(|o| o.author_id)
        .is_some_and(|author| author == identity.user_id);
    let target_company = owner.map(|o| o.company_id).or(identity.company_id);
    let in_own_company = |company_id: i64| identity.company_id == Some(company_id);

    match action {
        Action::Permission(code) => {
            require_permission(capabilities, code)?;
            match owner {
                Some(o) if !in_own_company(o.company_id) => Err(AccessError::OutsideCompany),
                _ => Ok(()),
            }
        }
        Action::ListCoachReports => {
            let company_id = target_company.ok_or(AccessError::OutsideCompany)?;
            require_grant(capabilities, company_id)
        }
        Action::ViewCoachReport => {
            if is_author {
                return Ok(());
            }
            require_permission(capabilities, permissions::VIEW_COACH_REPORTS)?;
            let company_id = target_company.ok_or(AccessError::OutsideCompany)?;
            require_grant(capabilities, company_id)
        }
        Action::CreateCoachReport => {
            require_permission(capabilities, permissions::ADD_COACH_REPORT)?;
            let company_id = target_company.ok_or(AccessError::OutsideCompany)?;
            if in_own_company(company_id) {
                Ok(())
            } else {
                require_grant(capabilities, company_id)
            }
        }
        Action::EditCoachReport | Action::DeleteCoachReport => {
            if is_author {
                Ok(())
            } else {
                Err(AccessError::NotAuthor)
            }
        }
        Action::ManageCoachReportAccess => Err(AccessError::AdminOnly),
    }
}

fn require_permission(capabilities: &Capabilities, code: &str) -> Result<(), AccessError> {
    if capabilities.has_permission(code) {
        Ok(())
    } else {
        Err(AccessError::MissingPermission(code.to_string()))
    }
}

fn require_grant(capabilities: &Capabilities, company_id: i64) -> Result<(), AccessError> {
    if capabilities.has_coach_report_grant(company_id) {
        Ok(())
    } else {
        Err(AccessError::NoCoachReportGrant(company_id))
    }
}

/// Which coach reports a caller may see in list views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoachReportScope {
    All,
    /// Reports of the granted companies plus reports the caller authored.
    Limited {
        company_ids: Vec<i64>,
        author_id: i64,
    },
}

#[must_use]
pub fn coach_report_scope(identity: &Identity, capabilities: &Capabilities) -> CoachReportScope {
    if identity.is_admin() {
        CoachReportScope::All
    } else {
        CoachReportScope::Limited {
            company_ids: capabilities.coach_report_companies(),
            author_id: identity.user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(perms: &[&str], grants: &[i64]) -> Capabilities {
        Capabilities::new(
            false,
            perms.iter().map(|p| (*p).to_string()),
            grants.iter().copied(),
        )
    }

    #[test]
    fn admin_is_allowed_everything() {
        let admin = Identity::admin(1, None);
        let none = Capabilities::default();
        let owner = ResourceOwner::authored(9, 42);
        for action in [
            Action::Permission(permissions::ADD_COMPANY),
            Action::ListCoachReports,
            Action::ViewCoachReport,
            Action::CreateCoachReport,
            Action::EditCoachReport,
            Action::DeleteCoachReport,
            Action::ManageCoachReportAccess,
        ] {
            assert_eq!(authorize(&admin, &none, action, Some(&owner)), Ok(()));
        }
    }

    #[test]
    fn permission_code_is_required_for_personnel() {
        let me = Identity::personnel(5, 1);
        let err = authorize(
            &me,
            &caps(&[], &[]),
            Action::Permission(permissions::ADD_CATEGORY),
            None,
        )
        .unwrap_err();
        assert_eq!(
            err,
            AccessError::MissingPermission(permissions::ADD_CATEGORY.to_string())
        );
        assert!(authorize(
            &me,
            &caps(&[permissions::ADD_CATEGORY], &[]),
            Action::Permission(permissions::ADD_CATEGORY),
            None,
        )
        .is_ok());
    }

    #[test]
    fn permission_does_not_cross_company_boundary() {
        let me = Identity::personnel(5, 1);
        let err = authorize(
            &me,
            &caps(&[permissions::VIEW_SOCIAL_PAGES], &[]),
            Action::Permission(permissions::VIEW_SOCIAL_PAGES),
            Some(&ResourceOwner::company(2)),
        )
        .unwrap_err();
        assert_eq!(err, AccessError::OutsideCompany);
    }

    #[test]
    fn non_author_without_grant_cannot_view_other_company_report() {
        let me = Identity::personnel(5, 1);
        let report = ResourceOwner::authored(2, 77);
        let err = authorize(
            &me,
            &caps(&[permissions::VIEW_COACH_REPORTS], &[1]),
            Action::ViewCoachReport,
            Some(&report),
        )
        .unwrap_err();
        assert_eq!(err, AccessError::NoCoachReportGrant(2));
    }

    #[test]
    fn grant_and_permission_allow_viewing() {
        let me = Identity::personnel(5, 1);
        let report = ResourceOwner::authored(2, 77);
        assert!(authorize(
            &me,
            &caps(&[permissions::VIEW_COACH_REPORTS], &[2]),
            Action::ViewCoachReport,
            Some(&report),
        )
        .is_ok());
    }

    #[test]
    fn grant_without_view_permission_is_not_enough() {
        let me = Identity::personnel(5, 1);
        let report = ResourceOwner::authored(1, 77);
        let err = authorize(&me, &caps(&[], &[1]), Action::ViewCoachReport, Some(&report))
            .unwrap_err();
        assert_eq!(
            err,
            AccessError::MissingPermission(permissions::VIEW_COACH_REPORTS.to_string())
        );
    }

    #[test]
    fn author_bypasses_permissions_for_view_edit_delete() {
        let me = Identity::personnel(77, 1);
        let report = ResourceOwner::authored(3, 77);
        let nothing = caps(&[], &[]);
        for action in [
            Action::ViewCoachReport,
            Action::EditCoachReport,
            Action::DeleteCoachReport,
        ] {
            assert_eq!(authorize(&me, &nothing, action, Some(&report)), Ok(()));
        }
    }

    #[test]
    fn non_author_cannot_edit_even_with_grant() {
        let me = Identity::personnel(5, 1);
        let report = ResourceOwner::authored(1, 77);
        let everything = caps(
            &[permissions::VIEW_COACH_REPORTS, permissions::ADD_COACH_REPORT],
            &[1],
        );
        assert_eq!(
            authorize(&me, &everything, Action::EditCoachReport, Some(&report)),
            Err(AccessError::NotAuthor)
        );
        assert_eq!(
            authorize(&me, &everything, Action::DeleteCoachReport, Some(&report)),
            Err(AccessError::NotAuthor)
        );
    }

    #[test]
    fn listing_requires_grant_for_own_company() {
        let me = Identity::personnel(5, 1);
        assert_eq!(
            authorize(&me, &caps(&[], &[]), Action::ListCoachReports, None),
            Err(AccessError::NoCoachReportGrant(1))
        );
        assert!(authorize(&me, &caps(&[], &[1]), Action::ListCoachReports, None).is_ok());
    }

    #[test]
    fn create_in_foreign_company_needs_grant() {
        let me = Identity::personnel(5, 1);
        let perms = [permissions::ADD_COACH_REPORT];
        assert!(authorize(
            &me,
            &caps(&perms, &[]),
            Action::CreateCoachReport,
            Some(&ResourceOwner::company(1)),
        )
        .is_ok());
        assert_eq!(
            authorize(
                &me,
                &caps(&perms, &[]),
                Action::CreateCoachReport,
                Some(&ResourceOwner::company(2)),
            ),
            Err(AccessError::NoCoachReportGrant(2))
        );
    }

    #[test]
    fn managing_grants_is_admin_only() {
        let me = Identity::personnel(5, 1);
        let all: Vec<&str> = permissions::CATALOG.iter().map(|p| p.code).collect();
        assert_eq!(
            authorize(
                &me,
                &caps(&all, &[1]),
                Action::ManageCoachReportAccess,
                None
            ),
            Err(AccessError::AdminOnly)
        );
    }

    #[test]
    fn scope_for_personnel_lists_granted_companies_sorted() {
        let me = Identity::personnel(5, 1);
        let scope = coach_report_scope(&me, &caps(&[], &[3, 1]));
        assert_eq!(
            scope,
            CoachReportScope::Limited {
                company_ids: vec![1, 3],
                author_id: 5
            }
        );
        assert_eq!(
            coach_report_scope(&Identity::admin(1, None), &Capabilities::default()),
            CoachReportScope::All
        );
    }

    #[test]
    fn user_type_parses_known_values() {
        assert_eq!("admin".parse::<UserType>(), Ok(UserType::Admin));
        assert_eq!("personnel".parse::<UserType>(), Ok(UserType::Personnel));
        assert!("root".parse::<UserType>().is_err());
    }
}
