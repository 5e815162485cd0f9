use eyre::Result;
use sqlx::{Pool, Postgres};
use tracing::info;

pub async fn initialize_database(pool: &Pool<Postgres>) -> Result<()> {
    info!("Initializing database schema...");

    // Create batches table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS batches (
            batch_id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            name VARCHAR(255) NOT NULL,
            created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create batch_members table (coordinator, academic operator, students, parents)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS batch_members (
            batch_id UUID NOT NULL REFERENCES batches(batch_id),
            email VARCHAR(255) NOT NULL,
            name VARCHAR(255) NOT NULL,
            role VARCHAR(32) NOT NULL,
            payment_status VARCHAR(16) NOT NULL DEFAULT 'unknown',
            linked_student_email VARCHAR(255) NULL,
            created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
            PRIMARY KEY (batch_id, email),
            CONSTRAINT valid_member_role CHECK (role IN ('student', 'parent', 'coordinator', 'academic_operator', 'observer'))
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create class_sessions table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS class_sessions (
            session_id UUID PRIMARY KEY,
            batch_id UUID NOT NULL REFERENCES batches(batch_id),
            subject VARCHAR(255) NOT NULL,
            teacher_email VARCHAR(255) NOT NULL,
            teacher_name VARCHAR(255) NOT NULL,
            scheduled_date DATE NOT NULL,
            start_time TIME NOT NULL,
            duration_minutes INTEGER NOT NULL CHECK (duration_minutes > 0),
            teaching_minutes INTEGER NOT NULL,
            prep_buffer_minutes INTEGER NOT NULL DEFAULT 15,
            status VARCHAR(16) NOT NULL DEFAULT 'scheduled',
            video_room_name VARCHAR(255) NOT NULL UNIQUE,
            started_at TIMESTAMP WITH TIME ZONE NULL,
            ended_at TIMESTAMP WITH TIME ZONE NULL,
            cancelled_at TIMESTAMP WITH TIME ZONE NULL,
            cancel_reason TEXT NULL,
            created_by VARCHAR(255) NOT NULL,
            created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
            CONSTRAINT valid_session_status CHECK (status IN ('scheduled', 'live', 'ended', 'cancelled')),
            CONSTRAINT valid_teaching_minutes CHECK (teaching_minutes > 0 AND teaching_minutes <= duration_minutes)
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create rooms table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rooms (
            room_id VARCHAR(255) PRIMARY KEY,
            room_name VARCHAR(255) NOT NULL,
            subject VARCHAR(255) NOT NULL,
            teacher_email VARCHAR(255) NOT NULL,
            status VARCHAR(16) NOT NULL DEFAULT 'scheduled',
            scheduled_start TIMESTAMP WITH TIME ZONE NOT NULL,
            duration_minutes INTEGER NOT NULL CHECK (duration_minutes > 0),
            open_at TIMESTAMP WITH TIME ZONE NOT NULL,
            expires_at TIMESTAMP WITH TIME ZONE NOT NULL,
            max_participants INTEGER NOT NULL DEFAULT 60,
            batch_id UUID NULL REFERENCES batches(batch_id),
            session_id UUID NULL UNIQUE REFERENCES class_sessions(session_id),
            created_by VARCHAR(255) NOT NULL,
            created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
            started_at TIMESTAMP WITH TIME ZONE NULL,
            ended_at TIMESTAMP WITH TIME ZONE NULL,
            CONSTRAINT valid_room_status CHECK (status IN ('scheduled', 'live', 'ended', 'cancelled')),
            CONSTRAINT valid_join_window CHECK (open_at < scheduled_start AND scheduled_start < expires_at)
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create room_assignments table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS room_assignments (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            room_id VARCHAR(255) NOT NULL REFERENCES rooms(room_id),
            participant_email VARCHAR(255) NOT NULL,
            participant_name VARCHAR(255) NOT NULL,
            participant_type VARCHAR(32) NOT NULL,
            payment_status VARCHAR(16) NOT NULL DEFAULT 'unknown',
            join_token VARCHAR(64) NULL UNIQUE,
            token_redeemed_at TIMESTAMP WITH TIME ZONE NULL,
            joined_at TIMESTAMP WITH TIME ZONE NULL,
            left_at TIMESTAMP WITH TIME ZONE NULL,
            created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
            CONSTRAINT unique_room_participant UNIQUE (room_id, participant_email)
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create room_events table (append-only audit log)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS room_events (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            room_id VARCHAR(255) NOT NULL REFERENCES rooms(room_id),
            session_id UUID NULL,
            event_type VARCHAR(64) NOT NULL,
            actor VARCHAR(255) NOT NULL,
            actor_role VARCHAR(32) NOT NULL,
            payload JSONB NOT NULL DEFAULT '{}'::jsonb,
            created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create session_fees table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS session_fees (
            room_id VARCHAR(255) NOT NULL REFERENCES rooms(room_id),
            student_email VARCHAR(255) NOT NULL,
            amount_minor BIGINT NOT NULL DEFAULT 0,
            paid BOOLEAN NOT NULL DEFAULT FALSE,
            paid_at TIMESTAMP WITH TIME ZONE NULL,
            PRIMARY KEY (room_id, student_email)
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create attendance table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS attendance (
            room_id VARCHAR(255) NOT NULL REFERENCES rooms(room_id),
            participant_email VARCHAR(255) NOT NULL,
            join_count INTEGER NOT NULL DEFAULT 0,
            first_joined_at TIMESTAMP WITH TIME ZONE NULL,
            last_joined_at TIMESTAMP WITH TIME ZONE NULL,
            last_left_at TIMESTAMP WITH TIME ZONE NULL,
            PRIMARY KEY (room_id, participant_email)
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create notification_ledger table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notification_ledger (
            id UUID PRIMARY KEY,
            recipient VARCHAR(255) NOT NULL,
            template_type VARCHAR(64) NOT NULL,
            dedup_key VARCHAR(255) NOT NULL,
            day DATE NOT NULL,
            status VARCHAR(16) NOT NULL DEFAULT 'pending',
            claimed_at TIMESTAMP WITH TIME ZONE NOT NULL,
            completed_at TIMESTAMP WITH TIME ZONE NULL,
            external_message_id VARCHAR(255) NULL,
            error TEXT NULL,
            CONSTRAINT valid_ledger_status CHECK (status IN ('pending', 'sent', 'failed')),
            CONSTRAINT unique_notification UNIQUE (recipient, template_type, dedup_key, day)
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_class_sessions_status_date ON class_sessions(status, scheduled_date);
        CREATE INDEX IF NOT EXISTS idx_class_sessions_batch_id ON class_sessions(batch_id);
        CREATE INDEX IF NOT EXISTS idx_rooms_status ON rooms(status);
        CREATE INDEX IF NOT EXISTS idx_room_assignments_room_id ON room_assignments(room_id);
        CREATE INDEX IF NOT EXISTS idx_room_events_room_id ON room_events(room_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_room_events_session_id ON room_events(session_id);
        CREATE INDEX IF NOT EXISTS idx_batch_members_linked ON batch_members(linked_student_email);
        CREATE INDEX IF NOT EXISTS idx_notification_ledger_key ON notification_ledger(template_type, dedup_key, day);
        "#,
    )
    .execute(pool)
    .await?;

    info!("Database schema initialized successfully.");
    Ok(())
}
