// Hand-written to mirror src/migrations/ (no diesel_cli was run).
//
// All entity ids and timestamps are stored as TEXT (UUID string / RFC3339),
// and structured payloads as TEXT-encoded JSON, the same convention the
// teacher's documents/sources tables use for `metadata` and timestamp
// columns. This keeps one schema definition valid against both the SQLite
// test backend and the Postgres deployment backend.

diesel::table! {
    jobs (id) {
        id -> Text,
        status -> Text,
        priority -> Integer,
        worker_id -> Nullable<Text>,
        source_kind -> Text,
        source_location -> Text,
        document_type -> Nullable<Text>,
        template_id -> Nullable<Text>,
        total_documents -> Integer,
        processed_documents -> Integer,
        failed_documents -> Integer,
        error -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
        started_at -> Nullable<Text>,
        paused_at -> Nullable<Text>,
        completed_at -> Nullable<Text>,
    }
}

diesel::table! {
    documents (id) {
        id -> Text,
        job_id -> Text,
        status -> Text,
        processing_stage -> Nullable<Text>,
        original_filename -> Text,
        object_key -> Text,
        mime_type -> Text,
        document_type -> Nullable<Text>,
        page_count -> Nullable<Integer>,
        pages_processed -> Integer,
        retry_count -> Integer,
        max_retries -> Integer,
        worker_id -> Nullable<Text>,
        processing_started_at -> Nullable<Text>,
        total_fields_extracted -> Integer,
        fields_needing_review -> Integer,
        average_confidence -> Nullable<Double>,
        extraction_time_ms -> Nullable<BigInt>,
        error -> Nullable<Text>,
        error_type -> Nullable<Text>,
        token_usage_json -> Nullable<Text>,
        cost -> Nullable<Double>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    extracted_fields (id) {
        id -> Text,
        job_id -> Text,
        document_id -> Text,
        field_name -> Text,
        field_label -> Nullable<Text>,
        field_type -> Text,
        value_json -> Text,
        field_group -> Nullable<Text>,
        page_number -> Nullable<Integer>,
        field_order -> Integer,
        confidence -> Double,
        validation_status -> Text,
        needs_manual_review -> Bool,
        bounding_box_json -> Nullable<Text>,
        section_name -> Nullable<Text>,
        source_location -> Nullable<Text>,
        extraction_context -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    document_transcripts (id) {
        id -> Text,
        document_id -> Text,
        transcript_text -> Text,
        index_json -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    review_queue_items (id) {
        id -> Text,
        job_id -> Text,
        document_id -> Text,
        field_id -> Nullable<Text>,
        reason -> Text,
        status -> Text,
        error_message -> Nullable<Text>,
        error_type -> Nullable<Text>,
        priority -> Integer,
        created_at -> Text,
        resolved_at -> Nullable<Text>,
    }
}

diesel::table! {
    mapping_templates (id) {
        id -> Text,
        name -> Text,
        document_type -> Text,
        column_mappings_json -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    tasks (id) {
        id -> Text,
        task_type -> Text,
        payload_json -> Text,
        status -> Text,
        priority -> Integer,
        attempt -> Integer,
        max_attempts -> Integer,
        wake_at -> Text,
        heartbeat -> Nullable<Text>,
        locked_by -> Nullable<Text>,
        last_error -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::joinable!(documents -> jobs (job_id));
diesel::joinable!(extracted_fields -> documents (document_id));
diesel::joinable!(document_transcripts -> documents (document_id));
diesel::joinable!(review_queue_items -> jobs (job_id));

diesel::allow_tables_to_appear_in_same_query!(
    jobs,
    documents,
    extracted_fields,
    document_transcripts,
    review_queue_items,
    mapping_templates,
    tasks,
);
