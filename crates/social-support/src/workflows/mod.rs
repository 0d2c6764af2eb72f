pub mod assistance;
