pub mod firestore;
pub mod supabase;
