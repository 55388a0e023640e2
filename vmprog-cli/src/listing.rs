use std::fmt::{self, Display};

/// Collects name/value pairs and renders them as an aligned, indented
/// listing.
pub struct ListingFormatter {
    indent: usize,
    values: Vec<(&'static str, String)>,
}

impl ListingFormatter {
    pub fn new(indent: usize) -> Self {
        Self {
            indent,
            values: Vec::new(),
        }
    }

    pub fn add(&mut self, name: &'static str, value: impl Display) {
        self.values.push((name, value.to_string()));
    }
}

impl Display for ListingFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name_width = self
            .values
            .iter()
            .map(|(name, _)| name.len())
            .max()
            .unwrap_or(0);

        for (name, value) in &self.values {
            writeln!(
                f,
                "{:indent$}{name}:{:padding$} {value}",
                "",
                "",
                indent = self.indent,
                padding = name_width - name.len(),
            )?;
        }

        Ok(())
    }
}
