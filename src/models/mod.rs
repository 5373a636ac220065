// Re-export all model types
pub use self::enums::*;
pub use self::errors::*;
pub use self::events::*;
pub use self::order::*;
pub use self::quiz::*;
pub use self::store::*;
pub use self::user::*;
pub use self::validation::*;

mod enums;
mod errors;
mod events;
mod order;
mod quiz;
mod store;
mod user;
mod validation;

use uuid::Uuid;

/// Short identifier: a type prefix followed by 8 hex characters
pub(crate) fn generate_id(prefix: char) -> String {
    let simple = Uuid::new_v4().simple().to_string();
    format!("{}{}", prefix, simple.get(0..8).unwrap_or("00000000"))
}

/// Records whose id is generated before the first write
pub trait GeneratedId {
    /// Draw a new id with the same prefix
    fn regenerate_id(&mut self);
}

impl GeneratedId for User {
    fn regenerate_id(&mut self) {
        self.id = generate_id('U');
    }
}

impl GeneratedId for Store {
    fn regenerate_id(&mut self) {
        self.id = generate_id('S');
    }
}

impl GeneratedId for ServiceOrder {
    fn regenerate_id(&mut self) {
        self.id = generate_id('O');
    }
}

impl GeneratedId for Quiz {
    fn regenerate_id(&mut self) {
        self.id = generate_id('Z');
    }
}
