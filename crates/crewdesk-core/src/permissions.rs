//! Permission codes granted to roles through `role_permissions`.

pub const VIEW_DASHBOARD: &str = "view_dashboard";

pub const VIEW_COMPANIES: &str = "view_companies";
pub const ADD_COMPANY: &str = "add_company";
pub const EDIT_COMPANY: &str = "edit_company";
pub const TOGGLE_COMPANY: &str = "toggle_company";

pub const VIEW_PERSONNEL: &str = "view_personnel";
pub const ADD_PERSONNEL: &str = "add_personnel";
pub const EDIT_PERSONNEL: &str = "edit_personnel";
pub const TOGGLE_PERSONNEL: &str = "toggle_personnel";

pub const VIEW_ROLES: &str = "view_roles";
pub const ADD_ROLE: &str = "add_role";
pub const EDIT_ROLE: &str = "edit_role";
pub const DELETE_ROLE: &str = "delete_role";
pub const MANAGE_PERMISSIONS: &str = "manage_permissions";

pub const VIEW_CATEGORIES: &str = "view_categories";
pub const ADD_CATEGORY: &str = "add_category";
pub const EDIT_CATEGORY: &str = "edit_category";
pub const DELETE_CATEGORY: &str = "delete_category";

pub const ADD_DAILY_REPORT: &str = "add_daily_report";
pub const VIEW_DAILY_REPORTS: &str = "view_daily_reports";
pub const EDIT_DAILY_REPORT: &str = "edit_daily_report";
pub const DELETE_DAILY_REPORT: &str = "delete_daily_report";

pub const VIEW_SOCIAL_NETWORKS: &str = "view_social_networks";
pub const ADD_SOCIAL_NETWORK: &str = "add_social_network";
pub const EDIT_SOCIAL_NETWORK: &str = "edit_social_network";
pub const DELETE_SOCIAL_NETWORK: &str = "delete_social_network";

pub const VIEW_SOCIAL_FIELDS: &str = "view_social_fields";
pub const ADD_SOCIAL_FIELD: &str = "add_social_field";
pub const EDIT_SOCIAL_FIELD: &str = "edit_social_field";
pub const DELETE_SOCIAL_FIELD: &str = "delete_social_field";

pub const VIEW_KPI_MODELS: &str = "view_kpi_models";

pub const VIEW_SOCIAL_PAGES: &str = "view_social_pages";
pub const ADD_SOCIAL_PAGE: &str = "add_social_page";
pub const EDIT_SOCIAL_PAGE: &str = "edit_social_page";
pub const DELETE_SOCIAL_PAGE: &str = "delete_social_page";

pub const VIEW_PAGE_KPIS: &str = "view_page_kpis";
pub const ADD_PAGE_KPI: &str = "add_page_kpi";
pub const EDIT_PAGE_KPI: &str = "edit_page_kpi";
pub const DELETE_PAGE_KPI: &str = "delete_page_kpi";

pub const VIEW_SOCIAL_REPORTS: &str = "view_social_reports";
pub const ADD_SOCIAL_REPORT: &str = "add_social_report";
pub const EDIT_SOCIAL_REPORT: &str = "edit_social_report";
pub const DELETE_SOCIAL_REPORT: &str = "delete_social_report";

pub const VIEW_EXPECTED_PERFORMANCE: &str = "view_expected_performance";

pub const VIEW_COACH_REPORTS: &str = "view_coach_reports";
pub const ADD_COACH_REPORT: &str = "add_coach_report";

/// A permission as stored in the `permissions` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionDef {
    pub code: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

const fn def(code: &'static str, name: &'static str, description: &'static str) -> PermissionDef {
    PermissionDef {
        code,
        name,
        description,
    }
}

/// Every permission the application checks. Seeded by `db seed`.
pub const CATALOG: &[PermissionDef] = &[
    def(VIEW_DASHBOARD, "View dashboard", "Access the dashboard"),
    def(VIEW_COMPANIES, "View companies", "List companies"),
    def(ADD_COMPANY, "Add company", "Create a new company"),
    def(EDIT_COMPANY, "Edit company", "Edit company details"),
    def(TOGGLE_COMPANY, "Toggle company", "Activate or deactivate a company"),
    def(VIEW_PERSONNEL, "View personnel", "List personnel"),
    def(ADD_PERSONNEL, "Add personnel", "Create personnel records"),
    def(EDIT_PERSONNEL, "Edit personnel", "Edit personnel records"),
    def(TOGGLE_PERSONNEL, "Toggle personnel", "Activate or deactivate personnel"),
    def(VIEW_ROLES, "View roles", "List roles"),
    def(ADD_ROLE, "Add role", "Create a role"),
    def(EDIT_ROLE, "Edit role", "Edit a role"),
    def(DELETE_ROLE, "Delete role", "Delete a role"),
    def(MANAGE_PERMISSIONS, "Manage permissions", "Assign permissions to roles"),
    def(VIEW_CATEGORIES, "View categories", "List report categories"),
    def(ADD_CATEGORY, "Add category", "Create a report category"),
    def(EDIT_CATEGORY, "Edit category", "Rename a report category"),
    def(DELETE_CATEGORY, "Delete category", "Delete a report category"),
    def(ADD_DAILY_REPORT, "Add daily report", "Submit a daily activity report"),
    def(VIEW_DAILY_REPORTS, "View daily reports", "Read daily activity reports"),
    def(EDIT_DAILY_REPORT, "Edit daily report", "Edit a daily activity report"),
    def(DELETE_DAILY_REPORT, "Delete daily report", "Delete a daily activity report"),
    def(VIEW_SOCIAL_NETWORKS, "View social networks", "List social networks"),
    def(ADD_SOCIAL_NETWORK, "Add social network", "Create a social network"),
    def(EDIT_SOCIAL_NETWORK, "Edit social network", "Edit a social network"),
    def(DELETE_SOCIAL_NETWORK, "Delete social network", "Delete a social network"),
    def(VIEW_SOCIAL_FIELDS, "View social fields", "List metric fields of networks"),
    def(ADD_SOCIAL_FIELD, "Add social field", "Define a metric field"),
    def(EDIT_SOCIAL_FIELD, "Edit social field", "Edit a metric field"),
    def(DELETE_SOCIAL_FIELD, "Delete social field", "Delete a metric field"),
    def(VIEW_KPI_MODELS, "View KPI models", "List KPI model templates"),
    def(VIEW_SOCIAL_PAGES, "View social pages", "List tracked social pages"),
    def(ADD_SOCIAL_PAGE, "Add social page", "Register a social page"),
    def(EDIT_SOCIAL_PAGE, "Edit social page", "Edit a social page"),
    def(DELETE_SOCIAL_PAGE, "Delete social page", "Delete a social page"),
    def(VIEW_PAGE_KPIS, "View page KPIs", "List KPIs attached to a page"),
    def(ADD_PAGE_KPI, "Add page KPI", "Attach a KPI to a page field"),
    def(EDIT_PAGE_KPI, "Edit page KPI", "Edit a page KPI"),
    def(DELETE_PAGE_KPI, "Delete page KPI", "Remove a page KPI"),
    def(VIEW_SOCIAL_REPORTS, "View social reports", "Read social metric reports"),
    def(ADD_SOCIAL_REPORT, "Add social report", "Submit a social metric report"),
    def(EDIT_SOCIAL_REPORT, "Edit social report", "Edit or rescore a social report"),
    def(DELETE_SOCIAL_REPORT, "Delete social report", "Delete a social report"),
    def(
        VIEW_EXPECTED_PERFORMANCE,
        "View expected performance",
        "See expected KPI values for a date",
    ),
    def(VIEW_COACH_REPORTS, "View coach reports", "Read coach evaluation reports"),
    def(ADD_COACH_REPORT, "Add coach report", "Author a coach evaluation report"),
];

/// Returns `true` if `code` is a known permission.
#[must_use]
pub fn is_known(code: &str) -> bool {
    CATALOG.iter().any(|p| p.code == code)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn catalog_codes_are_unique() {
        let mut seen = HashSet::new();
        for p in CATALOG {
            assert!(seen.insert(p.code), "duplicate permission code {}", p.code);
        }
    }

    #[test]
    fn coach_report_codes_are_known() {
        assert!(is_known(VIEW_COACH_REPORTS));
        assert!(is_known(ADD_COACH_REPORT));
        assert!(!is_known("launch_rockets"));
    }
}
