pub mod attachment;
pub mod blob;
pub mod variant_record;
