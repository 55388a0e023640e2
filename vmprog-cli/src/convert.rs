use anyhow::{bail, Result};
use vmprog::Value;

/// Lowers a parsed TOML document into the library's value tree.
///
/// The configuration schema only uses strings, integers, lists, and tables;
/// anything else in the document is rejected here rather than deep inside
/// the builder.
pub fn lower(value: toml::Value) -> Result<Value> {
    Ok(match value {
        toml::Value::String(s) => Value::Str(s),
        toml::Value::Integer(v) => Value::Int(v),
        toml::Value::Array(items) => {
            Value::List(items.into_iter().map(lower).collect::<Result<_>>()?)
        }
        toml::Value::Table(table) => Value::Table(
            table
                .into_iter()
                .map(|(key, value)| Ok((key, lower(value)?)))
                .collect::<Result<_>>()?,
        ),
        other => bail!("unsupported value '{other}' in the program description"),
    })
}
