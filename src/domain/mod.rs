// ============================================================
// Layer 3: Domain Layer
// ============================================================
// Plain Rust structs, enums and traits describing the concepts
// of the system: word pairs, transform and loss kinds, and the
// vocabulary abstraction the data and ml layers program against.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// A bilingual dictionary entry and its tokenisation spacing
pub mod word_pair;

// The frozen pretrained embedding matrix
pub mod embedding_table;

// Which transform / loss a run uses, parsed from config strings
pub mod kinds;

// Core abstractions (traits) that other layers implement
pub mod traits;
