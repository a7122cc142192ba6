// External lookups
pub mod geocoding;
pub mod location;

// Pure route math
pub mod routing;

// Quote submission and the first-quote check that precedes it
pub mod first_quote;
pub mod quotes;
