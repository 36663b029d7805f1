// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

use std::collections::HashMap;

use config::{ConfigError, Map, Source, Value};

/// Unprefixed variables understood by earlier deployments, mapped onto
/// configuration keys. Later prefixes are only consulted if earlier ones are unset.
const CLUSTER_VARIABLES: &[(&str, &[&str])] = &[
    ("source", &["SRC_SCYLLA", "PRD_SCYLLA"]),
    ("target", &["TGT_SCYLLA", "STG_SCYLLA"]),
];

const CLUSTER_FIELDS: &[&str] = &["contact_points", "username", "password", "keyspace"];

const BACKFILL_VARIABLES: &[(&str, &str)] = &[
    ("BATCH_SIZE", "backfill.batch_size"),
    ("MAX_RETRIES", "backfill.max_retries"),
    ("MAX_WORKERS", "backfill.max_workers"),
    ("ENABLE_RESUME", "backfill.enable_resume"),
    ("ENABLE_PARALLEL", "backfill.enable_parallel"),
];

#[derive(Debug, Clone)]
pub(super) struct LegacyEnvironment {
    variables: HashMap<String, String>,
}

impl LegacyEnvironment {
    pub(super) fn new(variables: HashMap<String, String>) -> Self {
        Self { variables }
    }

    pub(super) fn from_process() -> Self {
        Self::new(std::env::vars().collect())
    }

    fn lookup(&self, prefixes: &[&str], field: &str) -> Option<(String, &str)> {
        prefixes.iter().find_map(|prefix| {
            let name = format!("{prefix}_{}", field.to_uppercase());
            self.variables
                .get(&name)
                .map(|value| (name, value.as_str()))
        })
    }
}

impl Source for LegacyEnvironment {
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<Map<String, Value>, ConfigError> {
        let mut map = Map::new();

        for (section, prefixes) in CLUSTER_VARIABLES {
            for field in CLUSTER_FIELDS {
                let Some((name, value)) = self.lookup(prefixes, field) else {
                    continue;
                };
                let value = if *field == "contact_points" {
                    let points = value
                        .split(',')
                        .map(str::trim)
                        .filter(|point| !point.is_empty())
                        .map(|point| Value::new(Some(&name), point))
                        .collect::<Vec<_>>();
                    Value::new(Some(&name), points)
                } else {
                    Value::new(Some(&name), value)
                };
                map.insert(format!("{section}.{field}"), value);
            }
        }

        for (variable, key) in BACKFILL_VARIABLES {
            if let Some(value) = self.variables.get(*variable) {
                let name = variable.to_string();
                let value = match *key {
                    "backfill.enable_resume" | "backfill.enable_parallel" => {
                        Value::new(Some(&name), value.eq_ignore_ascii_case("true"))
                    }
                    _ => match value.trim().parse::<i64>() {
                        Ok(number) => Value::new(Some(&name), number),
                        Err(_) => Value::new(Some(&name), value.as_str()),
                    },
                };
                map.insert(key.to_string(), value);
            }
        }

        Ok(map)
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use config::Source;
    use test_log::test;

    use super::LegacyEnvironment;

    fn environment(pairs: &[(&str, &str)]) -> LegacyEnvironment {
        LegacyEnvironment::new(
            pairs
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect::<HashMap<_, _>>(),
        )
    }

    #[test]
    fn primary_prefix_wins() {
        let map = environment(&[
            ("SRC_SCYLLA_USERNAME", "src"),
            ("PRD_SCYLLA_USERNAME", "prd"),
            ("PRD_SCYLLA_KEYSPACE", "prd_keyspace"),
        ])
        .collect()
        .unwrap();

        assert_eq!(
            map["source.username"].clone().into_string().unwrap(),
            "src"
        );
        assert_eq!(
            map["source.keyspace"].clone().into_string().unwrap(),
            "prd_keyspace"
        );
        assert!(!map.contains_key("target.username"));
    }

    #[test]
    fn contact_points_are_split() {
        let map = environment(&[("TGT_SCYLLA_CONTACT_POINTS", "a, b,,c")])
            .collect()
            .unwrap();

        let points = map["target.contact_points"]
            .clone()
            .into_array()
            .unwrap()
            .into_iter()
            .map(|point| point.into_string().unwrap())
            .collect::<Vec<_>>();

        assert_eq!(points, ["a", "b", "c"]);
    }

    #[test]
    fn switches_compare_like_the_old_tool() {
        let map = environment(&[("ENABLE_RESUME", "TRUE"), ("ENABLE_PARALLEL", "yes")])
            .collect()
            .unwrap();

        assert!(map["backfill.enable_resume"].clone().into_bool().unwrap());
        assert!(!map["backfill.enable_parallel"].clone().into_bool().unwrap());
    }
}
