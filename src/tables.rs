// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

use std::{fs::read_to_string, path::Path};

use anyhow::{Result, bail};
use serde::Deserialize;

pub(crate) const DEFAULT_TABLES: &[&str] = &[
    "logistic_unbundling_details",
    "product_details",
    "shipment_details",
    "sscat_details",
    "supplier_details",
    "supplier_sscat_details",
];

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TablesFile {
    List(Vec<String>),
    Object { tables: Option<Vec<String>> },
}

/// Tables from the command line, else from `tables_file`, else the defaults.
pub(crate) fn resolve(requested: Vec<String>, tables_file: &Path) -> Result<Vec<String>> {
    let tables = if !requested.is_empty() {
        requested
    } else {
        match load(tables_file) {
            tables if !tables.is_empty() => tables,
            _ => {
                log::warn!("no tables configured, using the default tables");
                log::info!(
                    "to choose tables, create {tables_file:?} or pass them on the command line"
                );
                DEFAULT_TABLES.iter().map(|table| table.to_string()).collect()
            }
        }
    };

    for table in &tables {
        validate(table)?;
    }

    Ok(tables)
}

fn load(tables_file: &Path) -> Vec<String> {
    if !tables_file.exists() {
        return Vec::new();
    }

    let parsed = read_to_string(tables_file)
        .map_err(anyhow::Error::from)
        .and_then(|contents| Ok(serde_json::from_str::<TablesFile>(&contents)?));

    match parsed {
        Ok(TablesFile::List(tables)) => tables,
        Ok(TablesFile::Object { tables }) => tables.unwrap_or_default(),
        Err(err) => {
            log::warn!("failed to load tables from {tables_file:?}: {err}");
            Vec::new()
        }
    }
}

/// Table names end up in CQL text, so only plain identifiers are accepted.
pub(crate) fn validate(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let valid = chars.next().is_some_and(|first| first.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid {
        bail!("invalid table name {table:?}");
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::path::PathBuf;

    use test_log::test;

    use super::{DEFAULT_TABLES, resolve, validate};

    fn tables_file(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "proto-backfill-tables-{}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn strings(tables: &[&str]) -> Vec<String> {
        tables.iter().map(|table| table.to_string()).collect()
    }

    #[test]
    fn command_line_wins() {
        let file = tables_file("cli.json", r#"["from_file"]"#);

        assert_eq!(
            resolve(strings(&["events"]), &file).unwrap(),
            strings(&["events"])
        );
    }

    #[test]
    fn list_and_object_files() {
        let list = tables_file("list.json", r#"["a", "b"]"#);
        let object = tables_file("object.json", r#"{"tables": ["c"]}"#);

        assert_eq!(resolve(Vec::new(), &list).unwrap(), strings(&["a", "b"]));
        assert_eq!(resolve(Vec::new(), &object).unwrap(), strings(&["c"]));
    }

    #[test]
    fn falls_back_to_defaults() {
        let missing = std::env::temp_dir().join("proto-backfill-no-tables.json");
        let broken = tables_file("broken.json", "{not json");
        let other = tables_file("other.json", r#"{"views": ["v"]}"#);

        for file in [missing, broken, other] {
            assert_eq!(resolve(Vec::new(), &file).unwrap(), strings(DEFAULT_TABLES));
        }
    }

    #[test]
    fn rejects_unsafe_names() {
        assert!(validate("supplier_details").is_ok());
        assert!(validate("t2").is_ok());
        for name in ["", "2fast", "events; DROP TABLE x", "ks.table", "\"quoted\""] {
            assert!(validate(name).is_err(), "{name:?} should be rejected");
        }
        assert!(resolve(strings(&["ok", "not ok"]), std::path::Path::new("unused")).is_err());
    }
}
