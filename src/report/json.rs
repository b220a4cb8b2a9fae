use tracing::error;

use crate::report::{Reporter, Snapshot};

/// Writes each snapshot as one JSON line on stdout.
pub struct JsonReporter;

impl JsonReporter {
    pub fn render(snapshot: &Snapshot) -> Result<String, serde_json::Error> {
        serde_json::to_string(snapshot)
    }
}

impl Reporter for JsonReporter {
    fn report(&self, snapshot: &Snapshot) {
        match Self::render(snapshot) {
            Ok(line) => println!("{line}"),
            Err(e) => error!(error = %e, "failed to serialize snapshot"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Provenance;
    use crate::report::testing::snapshot;

    #[test]
    fn renders_undefined_values_as_null() {
        let snap = snapshot(Provenance::Synthetic);
        let line = JsonReporter::render(&snap).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();

        assert_eq!(value["summary"]["symbol"], "NQ=F");
        assert_eq!(value["summary"]["provenance"], "synthetic");
        assert_eq!(value["summary"]["synthetic"], true);
        assert!(value["quote"].is_null());
        assert!(value["indicators"]["RSI14"].is_number());
        assert_eq!(value["peers"][0]["symbol"], "^VIX");
    }
}
