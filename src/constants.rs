/// Collection and field name constants to ensure consistency across the codebase.
/// Every pipeline stage addresses documents through these canonical names; the
/// source-specific spellings live in the ingest adapters.

// Collection names
pub const TERRACES_COLLECTION: &str = "terraces";
pub const INSPECTIONS_COLLECTION: &str = "city_inspections";
pub const COUNTRIES_SMALL_COLLECTION: &str = "countries_small";
pub const COUNTRIES_BIG_COLLECTION: &str = "countries_big";
pub const ZONE_A_COLLECTION: &str = "zone_a";
pub const ZONE_B_COLLECTION: &str = "zone_b";

// Store-assigned identifier field, and the wrapper key some exports nest it in
pub const ID_FIELD: &str = "_id";
pub const ID_WRAPPER_KEY: &str = "$oid";

// Identity
pub const LOCAL_ID: &str = "local_id";
pub const TERRACE_ID: &str = "terrace_id";

// Location
pub const DISTRICT: &str = "district";
pub const NEIGHBORHOOD: &str = "neighborhood";
pub const STREET: &str = "street";
pub const STREET_NUMBER: &str = "street_number";
pub const POSTAL_CODE: &str = "postal_code";

// Status
pub const LOCATION_STATUS: &str = "location_status";
pub const TERRACE_STATUS: &str = "terrace_status";
pub const LOCATION_TYPE: &str = "location_type";
pub const ACCESS_TYPE: &str = "access_type";

// Capacity, in-season and rest-of-year variants
pub const TABLES_SEASON: &str = "tables_season";
pub const TABLES_REST: &str = "tables_rest";
pub const AUX_TABLES_SEASON: &str = "aux_tables_season";
pub const AUX_TABLES_REST: &str = "aux_tables_rest";
pub const CHAIRS_SEASON: &str = "chairs_season";
pub const CHAIRS_REST: &str = "chairs_rest";

// Closing times, zero-padded HH:MM:SS strings
pub const CLOSE_MON_THU_SEASON: &str = "close_mon_thu_season";
pub const CLOSE_MON_THU_REST: &str = "close_mon_thu_rest";
pub const CLOSE_FRI_SAT_SEASON: &str = "close_fri_sat_season";
pub const CLOSE_FRI_SAT_REST: &str = "close_fri_sat_rest";

// Derived fields
pub const INSPECT: &str = "inspect";
pub const STATUS_CODE: &str = "status_code";
pub const REVIEW: &str = "review";

// Canonical status vocabulary
pub const STATUS_OPEN: &str = "Open";
pub const STATUS_CLOSED: &str = "Closed";
pub const LOCATION_SIDEWALK: &str = "Sidewalk";

// Source ids for the input adapters
pub const OPEN_DATA_JSON_SOURCE: &str = "open_data_json";
pub const OPEN_DATA_CSV_SOURCE: &str = "open_data_csv";

/// The four capacity fields the normalizer coerces before any arithmetic runs.
pub const CAPACITY_FIELDS: [&str; 4] = [
    AUX_TABLES_SEASON,
    AUX_TABLES_REST,
    CHAIRS_SEASON,
    CHAIRS_REST,
];
