use lazy_static::lazy_static;
use sqlx::PgPool;

use crate::env;

lazy_static! {
    pub static ref DB_URL: String =
        env::get_env_var("DATABASE_URL").expect("DATABASE_URL is required");
}

pub fn get_db_url_with_name(name: &str) -> String {
    format!("{}?application_name={name}", *DB_URL)
}

pub async fn get_db_pool(name: &str) -> PgPool {
    PgPool::connect(&get_db_url_with_name(name))
        .await
        .expect("expect DB to be available to connect")
}
