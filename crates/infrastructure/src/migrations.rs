use sqlx::migrate::Migrator;

/// 嵌入二进制的数据库迁移脚本
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");
