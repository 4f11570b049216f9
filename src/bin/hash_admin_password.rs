//! Mints the ADMIN_PASSWORD_HASH value for the environment:
//! `cargo run --bin hash_admin_password -- <password>`

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};

fn main() {
    let password = match std::env::args().nth(1) {
        Some(p) => p,
        None => {
            eprintln!("usage: hash_admin_password <password>");
            std::process::exit(2);
        }
    };

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .expect("argon2 hashing failed");

    println!("{}", hash);
}
