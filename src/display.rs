//! Human-readable rendering of observations.

use std::fmt;

use crate::observation::Observation;

const RULE: &str = "-------------------------------------------";
const COLUMNS: [&str; 4] = ["object.@type", "object.@id", "propertyID", "value"];

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "@type: {} @id: {} pID: {} v: {}",
            self.object.entity_type, self.object.id, self.property_id, self.value
        )
    }
}

/// Aligned table of observations, one row each.
///
/// # Examples
///
/// ```
/// use observa::{EntityRef, ObservationTable, Reconciler};
///
/// let r = Reconciler::new();
/// let obs = r.observation().object(&EntityRef::new("Thing", "t1"))
///     .property("name").value("Widget").build().unwrap();
/// let rendered = ObservationTable(&[obs]).to_string();
/// assert!(rendered.contains("Observations (1)"));
/// assert!(rendered.contains("Widget"));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ObservationTable<'a>(pub &'a [Observation]);

impl ObservationTable<'_> {
    fn cells(obs: &Observation) -> [String; 4] {
        [
            obs.object.entity_type.clone(),
            obs.object.id.clone(),
            obs.property_id.clone(),
            obs.value.to_string(),
        ]
    }
}

impl fmt::Display for ObservationTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows: Vec<[String; 4]> = self.0.iter().map(Self::cells).collect();

        let mut widths = COLUMNS.map(|c| c.chars().count());
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let line = |cells: [&str; 4]| -> String {
            cells
                .iter()
                .zip(widths)
                .map(|(cell, width)| format!("{cell:<width$}"))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        };

        writeln!(f, "{RULE}")?;
        writeln!(f, "Observations ({})", rows.len())?;
        writeln!(f, "{RULE}")?;
        writeln!(f, "{}", line(COLUMNS))?;
        for row in &rows {
            writeln!(f, "{}", line([row[0].as_str(), row[1].as_str(), row[2].as_str(), row[3].as_str()]))?;
        }
        writeln!(f, "{RULE}")
    }
}
