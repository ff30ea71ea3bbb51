// Kept in sync with `submissions::postgres::SCHEMA_SQL`.

diesel::table! {
    applications (id) {
        id -> Int4,
        name -> Text,
        email -> Text,
        phone -> Nullable<Text>,
        position -> Nullable<Text>,
        message -> Nullable<Text>,
        files -> Nullable<Jsonb>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    quote_replies (id) {
        id -> Int4,
        quote_id -> Int4,
        subject -> Text,
        message -> Text,
        message_id -> Text,
        sent_at -> Timestamptz,
    }
}

diesel::table! {
    quotes (id) {
        id -> Int4,
        name -> Text,
        email -> Text,
        phone -> Nullable<Text>,
        service -> Nullable<Text>,
        message -> Nullable<Text>,
        files -> Nullable<Jsonb>,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(quote_replies -> quotes (quote_id));

diesel::allow_tables_to_appear_in_same_query!(applications, quote_replies, quotes,);
