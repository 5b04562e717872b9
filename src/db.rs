use std::{env, fs, path::Path};

use chrono::Utc;
use sqlx::SqlitePool;

use crate::auth::{hash_password, new_id};
use crate::models::{BarberRow, Role, UserRow};

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let path = if let Some(path) = db_url.strip_prefix("sqlite://") {
        Some(path)
    } else if let Some(path) = db_url.strip_prefix("sqlite:") {
        Some(path)
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(());
    };

    let path = path.split('?').next().unwrap_or(path);
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = path.strip_prefix("file:").unwrap_or(path);
    let db_path = Path::new(path);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Startup seeding. The admin account always exists; the demo fixture set
/// (sample client, barbers, services, promotion) loads only when
/// SEED_DEMO=true, keeping bootstrap data out of the request path.
pub async fn seed_defaults(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    seed_admin(pool).await?;
    if env::var("SEED_DEMO").unwrap_or_default() == "true" {
        seed_demo_fixtures(pool).await?;
    }
    Ok(())
}

async fn seed_admin(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let existing = sqlx::query_as::<_, (String,)>("SELECT id FROM users WHERE role = ? LIMIT 1")
        .bind(Role::Admin)
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    let email = env::var("ADMIN_EMAIL").unwrap_or_else(|_| "admin@test.com".to_string());
    let password = env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "password".to_string());
    if password == "password" {
        log::warn!("ADMIN_PASSWORD not set. Using default password 'password'. Set ADMIN_PASSWORD in production.");
    }

    let password_hash =
        hash_password(&password).map_err(|_| sqlx::Error::Protocol("password hash failed".into()))?;

    sqlx::query(
        r#"INSERT INTO users (id, email, password_hash, name, role, created_at)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(email)
    .bind(password_hash)
    .bind("Admin User")
    .bind(Role::Admin)
    .bind(Utc::now().naive_utc())
    .execute(pool)
    .await?;

    Ok(())
}

async fn seed_demo_fixtures(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let seeded =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM barbers")
            .fetch_one(pool)
            .await?;
    if seeded > 0 {
        return Ok(());
    }

    let now = Utc::now().naive_utc();

    for (name, color) in [("Luis", "#c66a2d"), ("Marco", "#2d6ac6")] {
        sqlx::query("INSERT INTO barbers (id, name, active, color) VALUES (?, ?, 1, ?)")
            .bind(new_id())
            .bind(name)
            .bind(color)
            .execute(pool)
            .await?;
    }

    for (name, price, minutes) in [
        ("Corte clásico", 15.0, 60),
        ("Corte y barba", 25.0, 60),
        ("Afeitado", 12.0, 60),
    ] {
        sqlx::query(
            "INSERT INTO appointment_types (id, name, price, duration_minutes) VALUES (?, ?, ?, ?)",
        )
        .bind(new_id())
        .bind(name)
        .bind(price)
        .bind(minutes)
        .execute(pool)
        .await?;
    }

    let password_hash =
        hash_password("password").map_err(|_| sqlx::Error::Protocol("password hash failed".into()))?;
    sqlx::query(
        r#"INSERT INTO users (id, email, password_hash, name, role, created_at)
           VALUES (?, 'test@test.com', ?, 'Test User', ?, ?)"#,
    )
    .bind(new_id())
    .bind(password_hash)
    .bind(Role::User)
    .bind(now)
    .execute(pool)
    .await?;

    sqlx::query(
        r#"INSERT INTO promotions (id, name, description, discount_percentage, valid_until)
           VALUES (?, 'Martes 2x1', 'Dos cortes por el precio de uno', 50.0, NULL)"#,
    )
    .bind(new_id())
    .execute(pool)
    .await?;

    log::info!("Loaded demo fixtures");
    Ok(())
}

pub async fn fetch_user(pool: &SqlitePool, id: &str) -> Result<Option<UserRow>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>(
        r#"SELECT id, email, password_hash, name, phone, gender, age, role, observations, created_at
           FROM users WHERE id = ? LIMIT 1"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn fetch_user_by_email(
    pool: &SqlitePool,
    email: &str,
) -> Result<Option<UserRow>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>(
        r#"SELECT id, email, password_hash, name, phone, gender, age, role, observations, created_at
           FROM users WHERE email = ? LIMIT 1"#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await
}

pub async fn fetch_barber(pool: &SqlitePool, id: &str) -> Result<Option<BarberRow>, sqlx::Error> {
    sqlx::query_as::<_, BarberRow>(
        "SELECT id, name, photo_url, active, color, user_id FROM barbers WHERE id = ? LIMIT 1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    // Single connection: every :memory: connection is its own database.
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    run_migrations(&pool).await.expect("migrations");
    pool
}

#[cfg(test)]
pub mod tests_support {
    use super::*;

    pub async fn insert_user(pool: &SqlitePool, email: &str, role: Role) -> String {
        let id = new_id();
        sqlx::query(
            r#"INSERT INTO users (id, email, password_hash, name, role, created_at)
               VALUES (?, ?, 'x', ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(email)
        .bind(email.split('@').next().unwrap_or("user"))
        .bind(role)
        .bind(Utc::now().naive_utc())
        .execute(pool)
        .await
        .expect("insert user");
        id
    }

    pub async fn insert_barber(pool: &SqlitePool, name: &str) -> String {
        let id = new_id();
        sqlx::query("INSERT INTO barbers (id, name, active) VALUES (?, ?, 1)")
            .bind(&id)
            .bind(name)
            .execute(pool)
            .await
            .expect("insert barber");
        id
    }
}
