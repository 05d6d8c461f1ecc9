use crate::error::{Error, Result};
use regex::Regex;
use std::sync::OnceLock;

/// GCP caps project ids at 30 characters.
pub const PROJECT_ID_MAX_LEN: usize = 30;

fn disallowed() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9-]").expect("static pattern"))
}

/// Derive the tenant project id from the company's normalized name and its
/// numeric id. Deterministic: the same inputs always yield the same id.
///
/// The name is cut at its first hyphen (the part after it is an internal
/// region suffix), lowercased, spaces become hyphens, `&` becomes `and`,
/// everything outside `[a-z0-9-]` is dropped, and the numeric id is appended
/// so ids stay unique across companies with colliding names. When the
/// combined id exceeds the 30-character cap, the name part is truncated;
/// the `-{company_id}` suffix always survives intact.
pub fn derive_project_id(company_new_name: &str, company_id: i64) -> Result<String> {
    let base = company_new_name
        .split('-')
        .next()
        .unwrap_or(company_new_name);

    let mut name = base.to_lowercase().replace(' ', "-").replace('&', "and");
    name = disallowed().replace_all(&name, "").into_owned();
    let name = name.trim_matches('-');

    if name.is_empty() {
        return Err(Error::Generation(company_new_name.to_string()));
    }

    let suffix = company_id.to_string();
    let max_name_len = PROJECT_ID_MAX_LEN - suffix.len() - 1;
    let name = if name.len() > max_name_len {
        name[..max_name_len].trim_end_matches('-')
    } else {
        name
    };

    Ok(format!("{name}-{suffix}"))
}

/// Dataset holding the tenant's ServiceTitan replica. BigQuery dataset ids
/// cannot contain hyphens, so the project id's hyphens map to underscores.
pub fn tenant_dataset_id(project_id: &str) -> String {
    format!("servicetitan_{}", project_id.replace('-', "_"))
}

pub fn service_account_email(account_id: &str, project_id: &str) -> String {
    format!("{account_id}@{project_id}.iam.gserviceaccount.com")
}

/// Fully qualified custom-role resource name.
pub fn role_name(project_id: &str, role_id: &str) -> String {
    format!("projects/{project_id}/roles/{role_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acme_west_with_id_7() {
        assert_eq!(derive_project_id("Acme-West", 7).unwrap(), "acme-7");
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = derive_project_id("Acme-West", 7).unwrap();
        let b = derive_project_id("Acme-West", 7).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn spaces_become_hyphens_and_case_folds() {
        assert_eq!(
            derive_project_id("Sunrise Plumbing", 12).unwrap(),
            "sunrise-plumbing-12"
        );
    }

    #[test]
    fn ampersand_becomes_and() {
        assert_eq!(derive_project_id("A&B Heating", 3).unwrap(), "aandb-heating-3");
    }

    #[test]
    fn punctuation_is_stripped() {
        assert_eq!(
            derive_project_id("O'Brien (North), Inc.", 44).unwrap(),
            "obrien-north-inc-44"
        );
    }

    #[test]
    fn long_names_truncate_but_keep_id_suffix() {
        let id = derive_project_id("An Extremely Long Company Name Here", 123456).unwrap();
        assert!(id.len() <= PROJECT_ID_MAX_LEN, "{id}");
        assert!(id.ends_with("-123456"));
    }

    #[test]
    fn truncation_never_leaves_a_double_hyphen() {
        // The cut point lands right after a word boundary hyphen.
        let id = derive_project_id("abcdefgh ijklmnopqrstuv wxyz", 9001).unwrap();
        assert!(!id.contains("--"), "{id}");
        assert!(id.ends_with("-9001"));
    }

    #[test]
    fn empty_name_is_a_generation_error() {
        assert!(matches!(
            derive_project_id("", 7),
            Err(Error::Generation(_))
        ));
    }

    #[test]
    fn symbol_only_name_is_a_generation_error() {
        assert!(matches!(
            derive_project_id("(((...)))", 7),
            Err(Error::Generation(_))
        ));
    }

    #[test]
    fn tenant_dataset_swaps_hyphens() {
        assert_eq!(tenant_dataset_id("acme-7"), "servicetitan_acme_7");
    }

    #[test]
    fn service_account_email_shape() {
        assert_eq!(
            service_account_email("data-analytics", "acme-7"),
            "data-analytics@acme-7.iam.gserviceaccount.com"
        );
    }

    #[test]
    fn role_name_shape() {
        assert_eq!(
            role_name("acme-7", "pphSheetsAnalyst"),
            "projects/acme-7/roles/pphSheetsAnalyst"
        );
    }
}
