//! Schema migration applied to every cluster pool before it serves traffic.
//!
//! The changelog is a directory of `*.sql` files applied in file-name order; each file is one
//! changeset identified by its file stem. A file may start with `-- context: a, b` to restrict
//! it to run contexts, and may contain a `-- rollback` line; everything below that line is the
//! changeset's rollback SQL. `${name}` placeholders are replaced from the migration parameters.

use crate::config::MigrationSettings;
use crate::error::MigrationError;
use crate::router::TenantPool;
use async_trait::async_trait;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use tokio::io::AsyncWriteExt;

/// Bookkeeping table recording applied changesets.
pub const CHANGELOG_TABLE: &str = "_tenant_changelog";

/// Runs schema migration against one cluster. Must finish before the pool is routed to.
#[async_trait]
pub trait SchemaMigrator: Send + Sync {
    async fn migrate(&self, target: &TenantPool, settings: &MigrationSettings) -> Result<(), MigrationError>;
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([A-Za-z0-9_.\-]+)\}").expect("static regex"))
}

/// Replace `${name}` with `parameters[name]`; unknown names are left as written.
pub fn substitute_parameters(text: &str, parameters: &HashMap<String, String>) -> String {
    placeholder()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            parameters
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Changeset {
    pub id: String,
    pub contexts: Vec<String>,
    pub sql: String,
    pub rollback: Option<String>,
}

impl Changeset {
    pub fn parse(id: &str, text: &str, parameters: &HashMap<String, String>) -> Self {
        let text = substitute_parameters(text, parameters);
        let mut contexts = Vec::new();
        for line in text.lines().map(str::trim) {
            if !line.starts_with("--") {
                break;
            }
            let comment = line.trim_start_matches('-').trim();
            let lower = comment.to_lowercase();
            if let Some(rest) = lower
                .strip_prefix("contexts:")
                .or_else(|| lower.strip_prefix("context:"))
            {
                contexts.extend(
                    rest.split(',')
                        .map(str::trim)
                        .filter(|c| !c.is_empty())
                        .map(str::to_string),
                );
            }
        }

        let mut sql = String::new();
        let mut rollback: Option<String> = None;
        for line in text.lines() {
            if rollback.is_none() && line.trim().eq_ignore_ascii_case("-- rollback") {
                rollback = Some(String::new());
                continue;
            }
            let target = rollback.as_mut().unwrap_or(&mut sql);
            target.push_str(line);
            target.push('\n');
        }

        Changeset {
            id: id.to_string(),
            contexts,
            sql,
            rollback: rollback.filter(|r| !r.trim().is_empty()),
        }
    }

    /// No run contexts selects everything; a changeset without contexts always runs.
    pub fn is_selected(&self, run_contexts: &[String]) -> bool {
        run_contexts.is_empty()
            || self.contexts.is_empty()
            || self
                .contexts
                .iter()
                .any(|c| run_contexts.iter().any(|r| r.eq_ignore_ascii_case(c)))
    }
}

/// Read every `*.sql` changeset of the changelog directory, sorted by file name.
pub async fn load_changelog(settings: &MigrationSettings) -> Result<Vec<Changeset>, MigrationError> {
    let dir = &settings.change_log;
    let io_err = |source: std::io::Error| MigrationError::Changelog {
        path: dir.clone(),
        source,
    };
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("sql") {
            files.push(path);
        }
    }
    files.sort();

    let mut changesets = Vec::with_capacity(files.len());
    for path in files {
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| MigrationError::Changelog {
                path: path.clone(),
                source,
            })?;
        changesets.push(Changeset::parse(&id, &text, &settings.parameters));
    }
    Ok(changesets)
}

/// Rollback SQL for the changesets applied in one run, newest first. `None` when none of them
/// carries a rollback section. Every entry ends with a newline so later appends start cleanly.
pub fn rollback_script(url: &str, applied: &[&Changeset]) -> Option<String> {
    let mut script = String::new();
    for changeset in applied.iter().rev() {
        let Some(rollback) = &changeset.rollback else {
            continue;
        };
        script.push_str(&format!("-- rollback {} on {}\n{}", changeset.id, url, rollback));
        if !rollback.ends_with('\n') {
            script.push('\n');
        }
    }
    (!script.is_empty()).then_some(script)
}

/// Applies the SQL changelog directory, recording progress in [`CHANGELOG_TABLE`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ChangelogMigrator;

#[async_trait]
impl SchemaMigrator for ChangelogMigrator {
    async fn migrate(&self, target: &TenantPool, settings: &MigrationSettings) -> Result<(), MigrationError> {
        let url = target.cluster_url.as_str();
        if !settings.enabled {
            tracing::info!(cluster = %url, "schema migration disabled, skipping");
            return Ok(());
        }
        let changesets = load_changelog(settings).await?;
        let pool = &target.pool;
        let db_err = |source: sqlx::Error| MigrationError::Database {
            url: url.to_string(),
            source,
        };

        let schema = quote(settings.default_schema.as_deref().unwrap_or("public"));
        if settings.drop_first {
            tracing::warn!(cluster = %url, schema = %schema, "dropping schema before migration");
            sqlx::query(&format!("DROP SCHEMA IF EXISTS {} CASCADE", schema))
                .execute(pool)
                .await
                .map_err(db_err)?;
        }
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema))
            .execute(pool)
            .await
            .map_err(db_err)?;

        let table = format!("{}.{}", schema, quote(CHANGELOG_TABLE));
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY, applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW())",
            table
        ))
        .execute(pool)
        .await
        .map_err(db_err)?;
        let applied: HashSet<String> = sqlx::query_scalar::<_, String>(&format!("SELECT id FROM {}", table))
            .fetch_all(pool)
            .await
            .map_err(db_err)?
            .into_iter()
            .collect();

        let mut applied_now = Vec::new();
        for changeset in changesets.iter().filter(|c| c.is_selected(&settings.contexts)) {
            if applied.contains(&changeset.id) {
                continue;
            }
            let cs_err = |source: sqlx::Error| MigrationError::Changeset {
                id: changeset.id.clone(),
                url: url.to_string(),
                source,
            };
            let mut tx = pool.begin().await.map_err(cs_err)?;
            sqlx::query(&format!("SET LOCAL search_path TO {}", schema))
                .execute(&mut *tx)
                .await
                .map_err(cs_err)?;
            sqlx::Executor::execute(&mut *tx, sqlx::raw_sql(&changeset.sql))
                .await
                .map_err(cs_err)?;
            sqlx::query(&format!("INSERT INTO {} (id) VALUES ($1)", table))
                .bind(&changeset.id)
                .execute(&mut *tx)
                .await
                .map_err(cs_err)?;
            tx.commit().await.map_err(cs_err)?;
            tracing::info!(cluster = %url, changeset = %changeset.id, "changeset applied");
            applied_now.push(changeset);
        }

        if let (Some(path), Some(script)) = (&settings.rollback_file, rollback_script(url, &applied_now)) {
            let file_err = |source: std::io::Error| MigrationError::RollbackFile {
                path: path.clone(),
                source,
            };
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .map_err(file_err)?;
            file.write_all(script.as_bytes())
                .await
                .map_err(file_err)?;
            file.flush().await.map_err(file_err)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_substituted() {
        let mut params = HashMap::new();
        params.insert("owner".to_string(), "app".to_string());
        assert_eq!(
            substitute_parameters("ALTER TABLE t OWNER TO ${owner}; -- ${unknown}", &params),
            "ALTER TABLE t OWNER TO app; -- ${unknown}"
        );
    }

    #[test]
    fn parses_contexts_and_rollback() {
        let text = "-- context: dev, Test\nCREATE TABLE a (id INT);\n-- rollback\nDROP TABLE a;\n";
        let cs = Changeset::parse("001_init", text, &HashMap::new());
        assert_eq!(cs.id, "001_init");
        assert_eq!(cs.contexts, vec!["dev", "test"]);
        assert!(cs.sql.contains("CREATE TABLE a"));
        assert!(!cs.sql.contains("DROP TABLE"));
        assert_eq!(cs.rollback.as_deref(), Some("DROP TABLE a;\n"));
    }

    #[test]
    fn context_selection() {
        let tagged = Changeset::parse("x", "-- context: dev\nSELECT 1;", &HashMap::new());
        let untagged = Changeset::parse("y", "SELECT 1;", &HashMap::new());
        assert!(tagged.is_selected(&[]));
        assert!(tagged.is_selected(&["DEV".to_string()]));
        assert!(!tagged.is_selected(&["prod".to_string()]));
        assert!(untagged.is_selected(&["prod".to_string()]));
    }

    #[tokio::test]
    async fn loads_sql_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("002_b.sql"), "SELECT 2;").unwrap();
        std::fs::write(dir.path().join("001_a.sql"), "SELECT ${n};").unwrap();
        std::fs::write(dir.path().join("README.md"), "ignored").unwrap();
        let mut settings = MigrationSettings {
            change_log: dir.path().to_path_buf(),
            ..MigrationSettings::default()
        };
        settings.parameters.insert("n".into(), "1".into());
        let changesets = load_changelog(&settings).await.unwrap();
        let ids: Vec<_> = changesets.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["001_a", "002_b"]);
        assert_eq!(changesets[0].sql.trim(), "SELECT 1;");
    }

    #[tokio::test]
    async fn missing_changelog_is_a_migration_error() {
        let settings = MigrationSettings {
            change_log: "/nonexistent/changelog/dir".into(),
            ..MigrationSettings::default()
        };
        assert!(matches!(
            load_changelog(&settings).await,
            Err(MigrationError::Changelog { .. })
        ));
    }

    fn lazy_target() -> TenantPool {
        let options = sqlx::postgres::PgConnectOptions::new()
            .host("127.0.0.1")
            .port(1)
            .database("unreachable");
        TenantPool {
            cluster_url: "postgres://127.0.0.1:1/unreachable".into(),
            pool: sqlx::postgres::PgPoolOptions::new().connect_lazy_with(options),
        }
    }

    #[tokio::test]
    async fn disabled_migration_never_connects() {
        let target = lazy_target();
        let settings = MigrationSettings {
            enabled: false,
            change_log: "/nonexistent/changelog/dir".into(),
            ..MigrationSettings::default()
        };
        ChangelogMigrator.migrate(&target, &settings).await.unwrap();
        assert_eq!(target.pool.size(), 0);
    }

    #[tokio::test]
    async fn unreadable_changelog_fails_before_connecting() {
        let target = lazy_target();
        let settings = MigrationSettings {
            change_log: "/nonexistent/changelog/dir".into(),
            ..MigrationSettings::default()
        };
        assert!(matches!(
            ChangelogMigrator.migrate(&target, &settings).await,
            Err(MigrationError::Changelog { .. })
        ));
        assert_eq!(target.pool.size(), 0);
    }

    #[test]
    fn rollback_script_is_newest_first_and_newline_terminated() {
        let params = HashMap::new();
        let first = Changeset::parse("001_a", "CREATE TABLE a (id INT);\n-- rollback\nDROP TABLE a;", &params);
        let plain = Changeset::parse("002_b", "SELECT 1;", &params);
        let third = Changeset::parse("003_c", "CREATE TABLE c (id INT);\n-- rollback\nDROP TABLE c;\n", &params);

        let script = rollback_script("postgres://h/c1", &[&first, &plain, &third]).unwrap();
        assert_eq!(
            script,
            "-- rollback 003_c on postgres://h/c1\nDROP TABLE c;\n\
             -- rollback 001_a on postgres://h/c1\nDROP TABLE a;\n"
        );
        assert!(rollback_script("postgres://h/c1", &[&plain]).is_none());
    }
}
