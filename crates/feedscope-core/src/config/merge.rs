//! Configuration layer merging
//!
//! Project entries override global entries of the same name field by
//! field; sources only defined in one layer pass through unchanged.

use super::schema::{FeedscopeConfig, SourceConfigEntry};

pub fn merge_configs(
    global: Option<FeedscopeConfig>,
    project: Option<FeedscopeConfig>,
) -> FeedscopeConfig {
    let mut merged = global.unwrap_or_default();
    if let Some(project) = project {
        for (name, entry) in project.source {
            match merged.source.get_mut(&name) {
                Some(existing) => merge_source_entry(existing, entry),
                None => {
                    merged.source.insert(name, entry);
                }
            }
        }
    }
    merged
}

fn merge_source_entry(base: &mut SourceConfigEntry, overlay: SourceConfigEntry) {
    // An overlay address replaces the whole address, never half of it.
    if overlay.url.is_some() || overlay.path.is_some() {
        base.url = overlay.url;
        base.path = overlay.path;
    }
    base.enabled = overlay.enabled;

    if overlay.username.is_some() {
        base.username = overlay.username;
        base.password = overlay.password;
    }
    if overlay.proxy.is_some() {
        base.proxy = overlay.proxy;
        base.proxy_username = overlay.proxy_username;
        base.proxy_password = overlay.proxy_password;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(entries: &[(&str, SourceConfigEntry)]) -> FeedscopeConfig {
        FeedscopeConfig {
            source: entries
                .iter()
                .map(|(n, e)| (n.to_string(), e.clone()))
                .collect(),
        }
    }

    #[test]
    fn test_project_adds_sources() {
        let merged = merge_configs(
            Some(config(&[("a", SourceConfigEntry::local("/a"))])),
            Some(config(&[("b", SourceConfigEntry::local("/b"))])),
        );
        assert_eq!(merged.source.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_project_overrides_fields() {
        let global = SourceConfigEntry {
            username: Some("me".into()),
            password: Some("secret".into()),
            ..SourceConfigEntry::http("https://feed.example/")
        };
        let project = SourceConfigEntry {
            url: None,
            path: None,
            enabled: false,
            ..SourceConfigEntry::default()
        };
        let merged = merge_configs(
            Some(config(&[("feed", global)])),
            Some(config(&[("feed", project)])),
        );

        let entry = &merged.source["feed"];
        assert!(!entry.enabled);
        assert_eq!(entry.url.as_deref(), Some("https://feed.example/"));
        assert_eq!(entry.username.as_deref(), Some("me"));
    }

    #[test]
    fn test_address_switch_replaces_both_fields() {
        let merged = merge_configs(
            Some(config(&[("feed", SourceConfigEntry::http("https://feed.example/"))])),
            Some(config(&[("feed", SourceConfigEntry::local("/mirror"))])),
        );
        let entry = &merged.source["feed"];
        assert_eq!(entry.url, None);
        assert_eq!(entry.path.as_deref(), Some("/mirror"));
        assert!(entry.validate().is_ok());
    }

    #[test]
    fn test_no_layers() {
        assert!(merge_configs(None, None).source.is_empty());
    }
}
