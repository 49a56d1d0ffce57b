pub mod battles;
