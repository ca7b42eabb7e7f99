pub mod find_names;
pub mod process_species;
pub mod process_text;
pub mod shared;
pub mod species_extra;
pub mod status;
pub mod verify_species;
