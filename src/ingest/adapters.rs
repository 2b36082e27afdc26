use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;

use crate::constants::{
    ACCESS_TYPE, AUX_TABLES_REST, AUX_TABLES_SEASON, CHAIRS_REST, CHAIRS_SEASON,
    CLOSE_FRI_SAT_REST, CLOSE_FRI_SAT_SEASON, CLOSE_MON_THU_REST, CLOSE_MON_THU_SEASON, DISTRICT,
    INSPECT, LOCAL_ID, LOCATION_SIDEWALK, LOCATION_STATUS, LOCATION_TYPE, NEIGHBORHOOD,
    OPEN_DATA_CSV_SOURCE, OPEN_DATA_JSON_SOURCE, POSTAL_CODE, STATUS_CLOSED, STATUS_OPEN, STREET,
    STREET_NUMBER, TABLES_REST, TABLES_SEASON, TERRACE_ID, TERRACE_STATUS,
};
use crate::domain::Document;

/// An input adapter maps one source naming scheme onto the canonical record
/// schema. Every downstream stage only ever sees canonical field names.
pub trait SourceAdapter: Send + Sync {
    /// Unique identifier for this source scheme
    fn source_id(&self) -> &str;

    /// Rewrite a source-shaped document into canonical shape
    fn adapt(&self, doc: Document) -> Document;
}

/// Look up the adapter for a source scheme.
pub fn adapter_for(source_id: &str) -> Option<Box<dyn SourceAdapter>> {
    match source_id {
        OPEN_DATA_JSON_SOURCE => Some(Box::new(OpenDataJsonAdapter)),
        OPEN_DATA_CSV_SOURCE => Some(Box::new(OpenDataCsvAdapter)),
        _ => None,
    }
}

/// Field spellings of the open-data JSON export.
static JSON_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("id_local", LOCAL_ID),
        ("id_terraza", TERRACE_ID),
        ("desc_distrito_local", DISTRICT),
        ("desc_barrio_local", NEIGHBORHOOD),
        ("DESC_NOMBRE", STREET),
        ("num_edificio", STREET_NUMBER),
        ("cod_postal", POSTAL_CODE),
        ("desc_situacion_local", LOCATION_STATUS),
        ("desc_situacion_terraza", TERRACE_STATUS),
        ("desc_ubicacion_terraza", LOCATION_TYPE),
        ("desc_tipo_acceso_local", ACCESS_TYPE),
        ("mesas_es", TABLES_SEASON),
        ("mesas_ra", TABLES_REST),
        ("mesas_aux_es", AUX_TABLES_SEASON),
        ("mesas_aux_ra", AUX_TABLES_REST),
        ("sillas_es", CHAIRS_SEASON),
        ("sillas_ra", CHAIRS_REST),
        ("hora_fin_LJ_es", CLOSE_MON_THU_SEASON),
        ("hora_fin_LJ_ra", CLOSE_MON_THU_REST),
        ("hora_fin_VS_es", CLOSE_FRI_SAT_SEASON),
        ("hora_fin_VS_ra", CLOSE_FRI_SAT_REST),
    ])
});

/// Field spellings of the CSV-derived export. Capacity fields here carry no
/// seasonal split, so they land on the in-season variants.
static CSV_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("id_local", LOCAL_ID),
        ("id_terraza", TERRACE_ID),
        ("distrito", DISTRICT),
        ("barrio", NEIGHBORHOOD),
        ("desc_vial_edificio", STREET),
        ("num_edificio", STREET_NUMBER),
        ("cod_postal", POSTAL_CODE),
        ("situacion_local", LOCATION_STATUS),
        ("situacion_terraza", TERRACE_STATUS),
        ("ubicacion_terraza", LOCATION_TYPE),
        ("num_mesas", TABLES_SEASON),
        ("num_sillas", CHAIRS_SEASON),
        ("requiere_inspeccion", INSPECT),
    ])
});

/// Per-day closing-time columns in the CSV scheme, folded onto the paired
/// canonical fields by lexicographic max (latest closing wins).
const CSV_MON_THU_COLUMNS: [&str; 4] = [
    "horario_cierre_lunes",
    "horario_cierre_martes",
    "horario_cierre_miercoles",
    "horario_cierre_jueves",
];
const CSV_FRI_SAT_COLUMNS: [&str; 2] = ["horario_cierre_viernes", "horario_cierre_sabado"];

/// Status vocabulary of the source data, mapped to the canonical terms.
fn translate_vocabulary(field: &str, value: Value) -> Value {
    if field != LOCATION_STATUS && field != TERRACE_STATUS && field != LOCATION_TYPE {
        return value;
    }
    match value {
        Value::String(s) => Value::String(match s.as_str() {
            "Abierta" | "Abierto" => STATUS_OPEN.to_string(),
            "Cerrada" | "Cerrado" => STATUS_CLOSED.to_string(),
            "Acera" => LOCATION_SIDEWALK.to_string(),
            _ => s,
        }),
        other => other,
    }
}

fn rename_fields(doc: Document, aliases: &HashMap<&'static str, &'static str>) -> Document {
    let mut canonical = Document::new();
    for (key, value) in doc {
        let target = aliases.get(key.as_str()).copied().unwrap_or(key.as_str());
        canonical.insert(target.to_string(), translate_vocabulary(target, value));
    }
    canonical
}

/// Adapter for the primary open-data JSON array.
pub struct OpenDataJsonAdapter;

impl SourceAdapter for OpenDataJsonAdapter {
    fn source_id(&self) -> &str {
        OPEN_DATA_JSON_SOURCE
    }

    fn adapt(&self, doc: Document) -> Document {
        rename_fields(doc, &JSON_ALIASES)
    }
}

/// Adapter for the CSV-derived scheme with per-day schedule columns.
pub struct OpenDataCsvAdapter;

impl SourceAdapter for OpenDataCsvAdapter {
    fn source_id(&self) -> &str {
        OPEN_DATA_CSV_SOURCE
    }

    fn adapt(&self, doc: Document) -> Document {
        let mut canonical = Document::new();
        let mut mon_thu: Option<String> = None;
        let mut fri_sat: Option<String> = None;

        for (key, value) in doc {
            if CSV_MON_THU_COLUMNS.contains(&key.as_str()) {
                if let Value::String(s) = value {
                    mon_thu = Some(match mon_thu.take() {
                        Some(cur) if cur >= s => cur,
                        _ => s,
                    });
                }
                continue;
            }
            if CSV_FRI_SAT_COLUMNS.contains(&key.as_str()) {
                if let Value::String(s) = value {
                    fri_sat = Some(match fri_sat.take() {
                        Some(cur) if cur >= s => cur,
                        _ => s,
                    });
                }
                continue;
            }
            let target = CSV_ALIASES.get(key.as_str()).copied().unwrap_or(key.as_str());
            canonical.insert(target.to_string(), translate_vocabulary(target, value));
        }

        if let Some(close) = mon_thu {
            canonical.insert(CLOSE_MON_THU_SEASON.to_string(), Value::String(close));
        }
        if let Some(close) = fri_sat {
            canonical.insert(CLOSE_FRI_SAT_SEASON.to_string(), Value::String(close));
        }
        canonical
    }
}
