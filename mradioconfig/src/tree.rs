//! Opérations sur l'arbre YAML de la configuration
//!
//! Les clés sont toujours comparées en minuscules : `Host.HTTP_Port` et
//! `host.http_port` désignent la même entrée.

use anyhow::{anyhow, Result};
use serde_yaml::{Mapping, Value};

/// Recopie `overlay` dans `base`
///
/// Les tables sont fusionnées clé par clé ; tout autre nœud (scalaire,
/// séquence) de `overlay` remplace celui de `base`.
pub(crate) fn merge(base: &mut Value, overlay: &Value) {
    if let (Value::Mapping(base_map), Value::Mapping(overlay_map)) = (&mut *base, overlay) {
        for (key, value) in overlay_map {
            if let Some(existing) = base_map.get_mut(key) {
                merge(existing, value);
            } else {
                base_map.insert(key.clone(), value.clone());
            }
        }
        return;
    }
    *base = overlay.clone();
}

/// Passe récursivement toutes les clés textuelles en minuscules
pub(crate) fn lowercase_keys(value: Value) -> Value {
    match value {
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(key, child)| {
                    let key = match key {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    (key, lowercase_keys(child))
                })
                .collect(),
        ),
        Value::Sequence(items) => Value::Sequence(items.into_iter().map(lowercase_keys).collect()),
        other => other,
    }
}

pub(crate) fn lookup<'a>(root: &'a Value, path: &[&str]) -> Result<&'a Value> {
    path.iter()
        .enumerate()
        .try_fold(root, |node, (depth, key)| match node {
            Value::Mapping(map) => map
                .get(Value::String(key.to_lowercase()))
                .ok_or_else(|| anyhow!("Missing configuration key {}", path[..=depth].join("."))),
            _ => Err(anyhow!(
                "Configuration node {} is not a table",
                path[..depth].join(".")
            )),
        })
}

/// Écrit `value` sous `path`, en créant les tables intermédiaires
pub(crate) fn assign(root: &mut Value, path: &[&str], value: Value) -> Result<()> {
    let Some((last, parents)) = path.split_last() else {
        *root = value;
        return Ok(());
    };

    let mut node = root;
    for key in parents {
        let Value::Mapping(map) = node else {
            return Err(anyhow!("Cannot create {} under a scalar", key));
        };
        node = map
            .entry(Value::String(key.to_lowercase()))
            .or_insert_with(|| Value::Mapping(Mapping::new()));
    }

    match node {
        Value::Mapping(map) => {
            map.insert(Value::String(last.to_lowercase()), value);
            Ok(())
        }
        _ => Err(anyhow!("Cannot set {} under a scalar", last)),
    }
}

/// Interprète une valeur d'environnement comme du YAML (`42`, `true`, ...)
pub(crate) fn parse_env_value(raw: &str) -> Value {
    serde_yaml::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Applique les variables `<prefix>SECTION__KEY=valeur`
pub(crate) fn apply_env_overrides(
    root: &mut Value,
    prefix: &str,
    vars: impl IntoIterator<Item = (String, String)>,
) {
    for (name, raw) in vars {
        let Some(suffix) = name.strip_prefix(prefix) else {
            continue;
        };
        let path: Vec<&str> = suffix.split("__").collect();
        if let Err(e) = assign(root, &path, parse_env_value(&raw)) {
            tracing::warn!(variable = %name, "Ignored configuration override: {}", e);
        }
    }
}
