pub(crate) mod exporters;
pub(crate) mod intervals;
pub(crate) mod source_checks;
pub(crate) mod values;
