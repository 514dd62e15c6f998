//! Esquema Diesel (escrito a mano). Reemplazable con `diesel print-schema`.

diesel::table! {
    cdc_event_log (id) {
        id -> BigInt,
        entity_name -> Text,
        operation -> Text,
        payload -> Jsonb,
        record_id -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    cdc_execution (id) {
        id -> BigInt,
        batch_id -> Text,
        event_id -> BigInt,
        processed -> Bool,
        created_at -> Timestamptz,
        modified_at -> Timestamptz,
    }
}

diesel::joinable!(cdc_execution -> cdc_event_log (event_id));

diesel::allow_tables_to_appear_in_same_query!(
    cdc_event_log,
    cdc_execution,
);
