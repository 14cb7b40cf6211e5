use crate::error::PipelineError;

/// Precomputed canonical-column → source-position mapping for one file.
///
/// Header order and letter case drift between the yearly files, so the
/// mapping is rebuilt per file and then applied per row without any further
/// name lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaMapping {
    indexes: Vec<usize>,
}

impl SchemaMapping {
    /// Locate every canonical column in `header`, case-insensitively.
    ///
    /// A canonical column missing from the header is fatal for the file:
    /// the destination schema has no way to absorb a partial row.
    pub fn build(header: &[String], canonical: &[String]) -> Result<Self, PipelineError> {
        let lowered: Vec<String> = header.iter().map(|h| h.trim().to_lowercase()).collect();

        let mut indexes = Vec::with_capacity(canonical.len());
        for column in canonical {
            let want = column.to_lowercase();
            match lowered.iter().position(|h| *h == want) {
                Some(idx) => indexes.push(idx),
                None => {
                    return Err(PipelineError::SchemaMismatch {
                        column: column.clone(),
                    })
                }
            }
        }

        Ok(Self { indexes })
    }

    /// Source position of each canonical column, in canonical order.
    pub fn indexes(&self) -> &[usize] {
        &self.indexes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn identity_header_maps_in_order() {
        let canonical = cols(&["OutID", "Regname", "engTestStatus", "engBall100"]);
        let mapping = SchemaMapping::build(&canonical, &canonical).unwrap();
        assert_eq!(mapping.indexes(), &[0, 1, 2, 3]);
    }

    #[test]
    fn reordered_and_recased_header_reconstructs_canonical_order() {
        let canonical = cols(&["OutID", "Regname", "engTestStatus", "engBall100"]);
        let header = cols(&["ENGBALL100", "outid", "EngTestStatus", "Birth", "REGNAME"]);

        let mapping = SchemaMapping::build(&header, &canonical).unwrap();
        assert_eq!(mapping.indexes(), &[1, 4, 2, 0]);

        // applying the mapping yields fields back in canonical order
        let projected: Vec<&str> = mapping
            .indexes()
            .iter()
            .map(|&idx| header[idx].as_str())
            .collect();
        assert_eq!(
            projected,
            vec!["outid", "REGNAME", "EngTestStatus", "ENGBALL100"]
        );
    }

    #[test]
    fn missing_column_is_named_in_the_error() {
        let canonical = cols(&["OutID", "Regname", "engBall100"]);
        let header = cols(&["OutID", "engBall100"]);

        let err = SchemaMapping::build(&header, &canonical).unwrap_err();
        match err {
            PipelineError::SchemaMismatch { column } => assert_eq!(column, "Regname"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn extra_source_columns_are_ignored() {
        let canonical = cols(&["OutID"]);
        let header = cols(&["Birth", "Sex", "outid", "Region"]);
        let mapping = SchemaMapping::build(&header, &canonical).unwrap();
        assert_eq!(mapping.indexes(), &[2]);
    }
}
