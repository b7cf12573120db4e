pub mod library_sync;
