//! Schema and example config generation.
//!
//! The JSON schema is derived from `AppConfig`. The example config is built
//! from that schema: one commented key per schema property, set to its
//! default or left commented out when it has none (credentials).

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use schemars::Schema;
use schemars::generate::SchemaSettings;
use serde_json::{Value, json};

use crate::config::AppConfig;
use crate::env_prefix;

/// Generated schema filename.
pub const SCHEMA_FILENAME: &str = "config.schema.json";

/// Generated config filename.
pub const CONFIG_FILENAME: &str = "config.toml";

/// Settable keys per config section, with their schema descriptions.
pub type SectionKeys = BTreeMap<String, BTreeMap<String, Option<String>>>;

fn root_schema() -> Schema {
    // draft-07 has the widest support among TOML language servers
    SchemaSettings::draft07()
        .into_generator()
        .into_root_schema_for::<AppConfig>()
}

/// Generate the JSON schema for `AppConfig`.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn generate_schema(project_name: &str, repo_url: &str) -> Result<String> {
    let mut schema = root_schema();

    schema.insert(
        "$id".to_string(),
        json!(format!("{repo_url}/schemas/{SCHEMA_FILENAME}")),
    );
    schema.insert(
        "title".to_string(),
        json!(format!("{project_name} configuration")),
    );

    if let Some(props) = schema.get_mut("properties").and_then(Value::as_object_mut) {
        props.insert(
            "$schema".to_string(),
            json!({
                "type": "string",
                "description": "JSON Schema reference for editor support"
            }),
        );
    }

    serde_json::to_string_pretty(&schema).context("serializing JSON schema")
}

/// Collect the keys of every config section from a generated schema.
///
/// Section schemas are followed through `$ref`, including the `allOf`
/// wrapper draft-07 uses when a reference carries a description.
#[must_use]
pub fn section_keys(schema: &Value) -> SectionKeys {
    let Some(sections) = schema.get("properties").and_then(Value::as_object) else {
        return SectionKeys::new();
    };

    sections
        .iter()
        .filter(|(name, _)| !name.starts_with('$'))
        .filter_map(|(name, node)| {
            let props = resolve(schema, node).get("properties")?.as_object()?;
            let keys = props
                .iter()
                .map(|(key, prop)| {
                    let description = prop
                        .get("description")
                        .and_then(Value::as_str)
                        .and_then(|d| d.lines().next())
                        .map(str::to_string);
                    (key.clone(), description)
                })
                .collect();
            Some((name.clone(), keys))
        })
        .collect()
}

fn resolve<'a>(root: &'a Value, node: &'a Value) -> &'a Value {
    node.get("$ref")
        .or_else(|| node.get("allOf")?.get(0)?.get("$ref"))
        .and_then(Value::as_str)
        .and_then(|reference| reference.strip_prefix('#'))
        .and_then(|pointer| root.pointer(pointer))
        .unwrap_or(node)
}

/// Render the default configuration as commented TOML.
///
/// # Errors
///
/// Returns an error if the defaults cannot be serialized.
pub fn default_config_document(project_name: &str) -> Result<String> {
    let keys = section_keys(root_schema().as_value());
    let defaults =
        toml::Value::try_from(AppConfig::default()).context("serializing default config")?;
    let prefix = env_prefix();

    let mut out = String::new();
    let _ = writeln!(out, "# Configuration for {project_name}.");
    let _ = writeln!(out, "#");
    let _ = writeln!(out, "# Credentials are best supplied through the environment:");
    let _ = writeln!(out, "#   {prefix}_REFRESH_TOKEN            long-lived refresh token, or");
    let _ = writeln!(out, "#   {prefix}_EMAIL + {prefix}_PASSWORD   browser sign-in on first use");
    let _ = writeln!(out, "#");
    let _ = writeln!(out, "# Any key can be overridden with {prefix}__<SECTION>__<KEY>,");
    let _ = writeln!(out, "# e.g. {prefix}__API__TIMEOUT=30.");

    for (section, entries) in &keys {
        let table = defaults.get(section).and_then(toml::Value::as_table);
        let _ = writeln!(out, "\n[{section}]");
        for (key, description) in entries {
            if let Some(description) = description {
                let _ = writeln!(out, "# {description}");
            }
            let line = table.and_then(|t| t.get(key)).map_or_else(
                || format!("# {key} = \"\""),
                |value| format!("{key} = {value}"),
            );
            let _ = writeln!(out, "{line}");
        }
    }

    Ok(out)
}

/// Generate the example TOML configuration, pointing at the published schema.
///
/// # Errors
///
/// Returns an error if TOML serialization fails.
pub fn generate_example_config(project_name: &str, repo_url: &str) -> Result<String> {
    let document = default_config_document(project_name)?;
    Ok(format!(
        "\"$schema\" = \"{repo_url}/schemas/{SCHEMA_FILENAME}\"\n\n{document}"
    ))
}

/// Write generated files to a directory.
///
/// # Errors
///
/// Returns an error if directory creation or file writing fails.
pub fn write_generated_files(output_dir: &Path, project_name: &str, repo_url: &str) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("creating output directory: {}", output_dir.display()))?;

    let files = [
        (SCHEMA_FILENAME, generate_schema(project_name, repo_url)?),
        (CONFIG_FILENAME, generate_example_config(project_name, repo_url)?),
    ];
    for (name, body) in files {
        let path = output_dir.join(name);
        fs::write(&path, body).with_context(|| format!("writing {}", path.display()))?;
    }

    Ok(())
}
