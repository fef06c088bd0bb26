use crate::config::ListenerConfig;
use crate::key::quote_ident;
use crate::key::TableRef;

/// Timestamp layout stamped by the trigger, always UTC.
pub const TRIGGER_TIMESTAMP_FORMAT: &str = "YYYY-MM-DD HH24:MI:SS.US";

/// Shared trigger function emitting one change notification per row.
///
/// The payload is `timestamp,schema,table,OP,origin,{"old":{..},"new":{..}}`
/// where both maps hold every column as text (`{}` for the missing side).
/// The origin comes from the session setting the writer sets inside its
/// transaction; external writers leave it empty.
///
/// PostgreSQL caps notification payloads at 8000 bytes, so very wide rows
/// cannot be captured.
pub fn trigger_function_ddl(config: &ListenerConfig) -> String {
    format!(
        r#"CREATE OR REPLACE FUNCTION {function}() RETURNS trigger AS $cellsync$
DECLARE
    old_map jsonb := '{{}}'::jsonb;
    new_map jsonb := '{{}}'::jsonb;
    origin text := coalesce(current_setting('{setting}', true), '');
BEGIN
    IF TG_OP <> 'INSERT' THEN
        SELECT coalesce(jsonb_object_agg(key, value), '{{}}'::jsonb) INTO old_map
        FROM json_each_text(row_to_json(OLD));
    END IF;
    IF TG_OP <> 'DELETE' THEN
        SELECT coalesce(jsonb_object_agg(key, value), '{{}}'::jsonb) INTO new_map
        FROM json_each_text(row_to_json(NEW));
    END IF;
    PERFORM pg_notify('{channel}',
        to_char(clock_timestamp() AT TIME ZONE 'UTC', '{ts}')
        || ',' || TG_TABLE_SCHEMA || ',' || TG_TABLE_NAME || ',' || TG_OP
        || ',' || origin || ','
        || jsonb_build_object('old', old_map, 'new', new_map)::text);
    RETURN NULL;
END;
$cellsync$ LANGUAGE plpgsql;"#,
        function = quote_ident(&config.trigger_function),
        setting = config.origin_setting,
        channel = config.channel,
        ts = TRIGGER_TIMESTAMP_FORMAT,
    )
}

/// Per-row trigger on `table`. Re-running it replaces the trigger.
pub fn table_trigger_ddl(
    config: &ListenerConfig,
    table: &TableRef,
) -> String {
    let trigger = quote_ident(&config.trigger_function);
    format!(
        "DROP TRIGGER IF EXISTS {trigger} ON {table};\n\
         CREATE TRIGGER {trigger} AFTER INSERT OR UPDATE OR DELETE ON {table} \
         FOR EACH ROW EXECUTE FUNCTION {trigger}();",
        table = table.quoted(),
    )
}
