pub(crate) mod outbound;
pub(crate) mod read;
