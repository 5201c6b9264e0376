use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tipo de tarea soportado por el motor unificado.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    #[default]
    Normal,
    Classification,
    Segmentation,
    Obb,
}

/// Preferencia de motor indicada por el operador.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineHint {
    #[default]
    Auto,
    Legacy,
    Unified,
}

/// Resultado del sondeo de bytes sobre el fichero de modelo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Legacy,
    Unified,
}

/// Valor por clase: un conteo entero para detección/segmentación/obb,
/// o la confianza top-1 (en [0,1]) para clasificación.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClassStat {
    Count(u64),
    Score(f32),
}

/// Resultado de una inferencia: ruta pública de la imagen anotada
/// más el mapa clase → conteo/confianza.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionOutcome {
    pub annotated_path: String,
    pub class_counts: BTreeMap<String, ClassStat>,
}

/// Agrupa etiquetas repetidas en conteos por clase.
pub fn tally_labels<'a, I>(labels: I) -> BTreeMap<String, ClassStat>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for label in labels {
        *counts.entry(label.to_string()).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|(label, n)| (label, ClassStat::Count(n)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_groups_repeated_labels() {
        let counts = tally_labels(["perro", "gato", "perro", "perro"]);
        assert_eq!(counts.get("perro"), Some(&ClassStat::Count(3)));
        assert_eq!(counts.get("gato"), Some(&ClassStat::Count(1)));
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn tally_sum_equals_detection_count() {
        let labels = ["a", "b", "a", "c", "b", "a"];
        let counts = tally_labels(labels);
        let total: u64 = counts
            .values()
            .map(|s| match s {
                ClassStat::Count(n) => *n,
                ClassStat::Score(_) => 0,
            })
            .sum();
        assert_eq!(total as usize, labels.len());
    }

    #[test]
    fn class_stat_serializes_as_plain_numbers() {
        let mut counts = BTreeMap::new();
        counts.insert("perro".to_string(), ClassStat::Count(2));
        counts.insert("gato".to_string(), ClassStat::Score(0.87));
        let json = serde_json::to_string(&counts).unwrap();
        assert_eq!(json, r#"{"gato":0.87,"perro":2}"#);
    }

    #[test]
    fn task_kind_parses_lowercase_names() {
        let task: TaskKind = serde_json::from_str("\"segmentation\"").unwrap();
        assert_eq!(task, TaskKind::Segmentation);
        let hint: EngineHint = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(hint, EngineHint::Auto);
    }
}
