use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            email           TEXT NOT NULL UNIQUE,
            password        TEXT NOT NULL,
            first_name      TEXT NOT NULL,
            last_name       TEXT NOT NULL,
            nickname        TEXT,
            date_of_birth   TEXT,
            about           TEXT,
            avatar          TEXT,
            privacy         TEXT NOT NULL DEFAULT 'public',
            failed_logins   INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS user_groups (
            id          TEXT PRIMARY KEY,
            creator_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            title       TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS posts (
            id          TEXT PRIMARY KEY,
            author_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            group_id    TEXT REFERENCES user_groups(id) ON DELETE CASCADE,
            content     TEXT NOT NULL,
            image       TEXT,
            privacy     TEXT NOT NULL DEFAULT 'public',
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS comments (
            id          TEXT PRIMARY KEY,
            post_id     TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
            author_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            content     TEXT NOT NULL,
            image       TEXT,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS followers (
            follower_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            followed_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at  TEXT NOT NULL,
            PRIMARY KEY (follower_id, followed_id)
        );

        CREATE INDEX IF NOT EXISTS idx_followers_followed
            ON followers(followed_id);

        CREATE TABLE IF NOT EXISTS follow_requests (
            requester_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            target_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at   TEXT NOT NULL,
            PRIMARY KEY (requester_id, target_id)
        );

        CREATE TABLE IF NOT EXISTS group_members (
            group_id    TEXT NOT NULL REFERENCES user_groups(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            joined_at   TEXT NOT NULL,
            PRIMARY KEY (group_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS events (
            id          TEXT PRIMARY KEY,
            group_id    TEXT NOT NULL REFERENCES user_groups(id) ON DELETE CASCADE,
            creator_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            title       TEXT NOT NULL,
            description TEXT NOT NULL,
            starts_at   TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS notifications (
            id            TEXT PRIMARY KEY,
            recipient_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            actor_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            kind          TEXT NOT NULL,
            target_id     TEXT,
            description   TEXT NOT NULL,
            created_at    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_recipient
            ON notifications(recipient_id, created_at);

        CREATE TABLE IF NOT EXISTS messages (
            id            TEXT PRIMARY KEY,
            sender_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            recipient_id  TEXT REFERENCES users(id) ON DELETE CASCADE,
            group_id      TEXT REFERENCES user_groups(id) ON DELETE CASCADE,
            body          TEXT NOT NULL,
            created_at    TEXT NOT NULL,
            CHECK ((recipient_id IS NULL) <> (group_id IS NULL))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_group
            ON messages(group_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
