// Esquema Diesel compartido por SQLite y Postgres.
// Tablas: form_templates, requests, work_items, step_records
use diesel::allow_tables_to_appear_in_same_query;
diesel::table! {
    form_templates (id) {
        id -> Text,
        name -> Text,
        note -> Nullable<Text>,
        field_config -> Text,
        process -> Text,
        created_at_ts -> BigInt,
    }
}
diesel::table! {
    requests (id) {
        id -> Text,
        template_id -> Text,
        template_name -> Text,
        template_revision -> Text,
        submitter_id -> Text,
        field_data -> Text,
        process -> Text,
        overall_status -> Text,
        current_step_index -> Integer,
        version -> BigInt,
        created_at_ts -> BigInt,
        updated_at_ts -> BigInt,
    }
}
diesel::table! {
    work_items (id) {
        id -> Text,
        request_id -> Text,
        template_id -> Text,
        step_index -> Integer,
        assigned_role -> Text,
        assigned_actor_id -> Nullable<Text>,
        status -> Text,
        decision -> Text,
        attachments -> Text,
        routed_by -> Nullable<Text>,
        routed_at_ts -> Nullable<BigInt>,
        decided_by -> Nullable<Text>,
        decided_at_ts -> Nullable<BigInt>,
        created_at_ts -> BigInt,
    }
}
diesel::table! {
    step_records (id) {
        id -> Text,
        request_id -> Text,
        work_item_id -> Text,
        seq -> BigInt,
        step_index -> Integer,
        actor_role -> Text,
        actor_id -> Nullable<Text>,
        decision -> Text,
        timestamp_ts -> BigInt,
    }
}
allow_tables_to_appear_in_same_query!(form_templates, requests, work_items, step_records);
