//! PostgreSQL store.
//!
//! Reservations lock the property row with `SELECT ... FOR UPDATE` before
//! reading its bookings, so concurrent reservations on one property run one
//! after the other. The `bookings_no_overlap` exclusion constraint backs the
//! check at the schema level. Every write and its outbox row share a
//! transaction.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::error::DatabaseError;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, error};

use super::{Planner, ReservationSnapshot, Store};
use crate::base::{
    BlockId, BookingId, CoHostId, ContractId, PropertyId, RecipientId, RegulationId, UserId,
};
use crate::error::RentalError;
use crate::events::{DomainEvent, OutboxRecord};
use crate::models::{
    AvailabilityBlock, Booking, BookingStatus, CoHost, CoHostRole, CoHostUpdate, Contract,
    ContractReminder, ContractStatus, DocumentType, Property, PropertyUpdate, Regulation,
    RegulationFilter, RegulationRecipient, RegulationStatus, Review,
};
use crate::range::StayRange;

/// Store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Maps constraint violations onto the domain refusals they stand for.
fn classify(err: sqlx::Error) -> RentalError {
    let err = DatabaseError::Query(err);
    let constraint = err.violated_constraint().map(str::to_owned);
    match constraint.as_deref() {
        Some("bookings_no_overlap") => RentalError::DateConflict,
        Some("reviews_booking_id_key") => {
            RentalError::Conflict("you have already reviewed this booking".to_string())
        }
        Some("cohosts_property_user_key") => RentalError::Duplicate,
        Some("availability_blocks_property_range_key") => RentalError::RangeConflict,
        Some("contracts_customer_number_key") => RentalError::Conflict(
            "a contract with this customer number already exists".to_string(),
        ),
        Some("regulations_dates_check") => RentalError::invalid(
            "expiration_date",
            "expiration date must be after effective date",
        ),
        Some("bookings_payment_session_idx") => {
            RentalError::Conflict("payment session is already attached".to_string())
        }
        Some(other) => {
            error!("Unmapped constraint violation on {}: {}", other, err);
            RentalError::Storage(err)
        }
        None => RentalError::Storage(err),
    }
}

fn decode_err(err: crate::models::UnknownVariant) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(err))
}

fn property_from_row(row: &PgRow) -> Result<Property, sqlx::Error> {
    Ok(Property {
        id: row.try_get("id")?,
        host_id: row.try_get("host_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        address_street: row.try_get("address_street")?,
        address_city: row.try_get("address_city")?,
        address_state: row.try_get("address_state")?,
        address_zip_code: row.try_get("address_zip_code")?,
        address_country: row.try_get("address_country")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        property_type: row.try_get("property_type")?,
        room_category: row.try_get("room_category")?,
        price_per_night: row.try_get("price_per_night")?,
        max_guests: row.try_get("max_guests")?,
        num_bedrooms: row.try_get("num_bedrooms")?,
        num_beds: row.try_get("num_beds")?,
        num_bathrooms: row.try_get("num_bathrooms")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn booking_from_row(row: &PgRow) -> Result<Booking, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(Booking {
        id: row.try_get("id")?,
        guest_id: row.try_get("guest_id")?,
        property_id: row.try_get("property_id")?,
        check_in_date: row.try_get("check_in_date")?,
        check_out_date: row.try_get("check_out_date")?,
        num_guests: row.try_get("num_guests")?,
        total_price: row.try_get("total_price")?,
        status: status.parse::<BookingStatus>().map_err(decode_err)?,
        payment_session: row.try_get("payment_session")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn block_from_row(row: &PgRow) -> Result<AvailabilityBlock, sqlx::Error> {
    Ok(AvailabilityBlock {
        id: row.try_get("id")?,
        property_id: row.try_get("property_id")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        is_available: row.try_get("is_available")?,
        created_at: row.try_get("created_at")?,
    })
}

fn review_from_row(row: &PgRow) -> Result<Review, sqlx::Error> {
    Ok(Review {
        id: row.try_get("id")?,
        booking_id: row.try_get("booking_id")?,
        guest_id: row.try_get("guest_id")?,
        property_id: row.try_get("property_id")?,
        rating: row.try_get("rating")?,
        comment: row.try_get("comment")?,
        created_at: row.try_get("created_at")?,
    })
}

fn cohost_from_row(row: &PgRow) -> Result<CoHost, sqlx::Error> {
    let role: String = row.try_get("role")?;
    Ok(CoHost {
        id: row.try_get("id")?,
        property_id: row.try_get("property_id")?,
        user_id: row.try_get("user_id")?,
        role: role.parse::<CoHostRole>().map_err(decode_err)?,
        can_manage_bookings: row.try_get("can_manage_bookings")?,
        can_manage_calendar: row.try_get("can_manage_calendar")?,
        can_manage_listing: row.try_get("can_manage_listing")?,
        can_manage_finances: row.try_get("can_manage_finances")?,
        can_manage_messages: row.try_get("can_manage_messages")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn contract_from_row(row: &PgRow) -> Result<Contract, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(Contract {
        id: row.try_get("id")?,
        created_by: row.try_get("created_by")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        customer_name: row.try_get("customer_name")?,
        customer_email: row.try_get("customer_email")?,
        customer_phone: row.try_get("customer_phone")?,
        customer_number: row.try_get("customer_number")?,
        status: status.parse::<ContractStatus>().map_err(decode_err)?,
        sent_at: row.try_get("sent_at")?,
        signed_at: row.try_get("signed_at")?,
        signer_name: row.try_get("signer_name")?,
        expiration_date: row.try_get("expiration_date")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn reminder_from_row(row: &PgRow) -> Result<ContractReminder, sqlx::Error> {
    Ok(ContractReminder {
        id: row.try_get("id")?,
        contract_id: row.try_get("contract_id")?,
        sent_by: row.try_get("sent_by")?,
        notes: row.try_get("notes")?,
        sent_at: row.try_get("sent_at")?,
    })
}

fn regulation_from_row(row: &PgRow) -> Result<Regulation, sqlx::Error> {
    let document_type: String = row.try_get("document_type")?;
    let status: String = row.try_get("status")?;
    Ok(Regulation {
        id: row.try_get("id")?,
        created_by: row.try_get("created_by")?,
        property_id: row.try_get("property_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        body: row.try_get("body")?,
        document_name: row.try_get("document_name")?,
        document_type: document_type.parse::<DocumentType>().map_err(decode_err)?,
        status: status.parse::<RegulationStatus>().map_err(decode_err)?,
        effective_date: row.try_get("effective_date")?,
        expiration_date: row.try_get("expiration_date")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn recipient_from_row(row: &PgRow) -> Result<RegulationRecipient, sqlx::Error> {
    Ok(RegulationRecipient {
        id: row.try_get("id")?,
        regulation_id: row.try_get("regulation_id")?,
        user_id: row.try_get("user_id")?,
        sent_at: row.try_get("sent_at")?,
        viewed_at: row.try_get("viewed_at")?,
        acknowledged: row.try_get("acknowledged")?,
        acknowledged_at: row.try_get("acknowledged_at")?,
    })
}

fn collect<T>(
    rows: Vec<PgRow>,
    map: fn(&PgRow) -> Result<T, sqlx::Error>,
) -> Result<Vec<T>, RentalError> {
    rows.iter()
        .map(|row| map(row).map_err(RentalError::from))
        .collect()
}

async fn append_event(
    tx: &mut Transaction<'_, Postgres>,
    event: &DomainEvent,
) -> Result<(), RentalError> {
    sqlx::query("INSERT INTO outbox_events (payload) VALUES ($1)")
        .bind(Json(event))
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn insert_booking(
    tx: &mut Transaction<'_, Postgres>,
    booking: &Booking,
) -> Result<(), RentalError> {
    sqlx::query(
        r#"
        INSERT INTO bookings (id, guest_id, property_id, check_in_date, check_out_date,
                              num_guests, total_price, status, payment_session,
                              created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(booking.id)
    .bind(booking.guest_id)
    .bind(booking.property_id)
    .bind(booking.check_in_date)
    .bind(booking.check_out_date)
    .bind(booking.num_guests)
    .bind(booking.total_price)
    .bind(booking.status.as_str())
    .bind(booking.payment_session.as_deref())
    .bind(booking.created_at)
    .bind(booking.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(classify)?;
    Ok(())
}

async fn lock_booking(
    tx: &mut Transaction<'_, Postgres>,
    id: BookingId,
) -> Result<Booking, RentalError> {
    let row = sqlx::query("SELECT * FROM bookings WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(RentalError::NotFound("booking"))?;
    Ok(booking_from_row(&row)?)
}

async fn save_booking_state(
    tx: &mut Transaction<'_, Postgres>,
    booking: &Booking,
) -> Result<(), RentalError> {
    sqlx::query(
        "UPDATE bookings SET status = $2, payment_session = $3, updated_at = $4 WHERE id = $1",
    )
    .bind(booking.id)
    .bind(booking.status.as_str())
    .bind(booking.payment_session.as_deref())
    .bind(booking.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(classify)?;
    Ok(())
}

#[async_trait]
impl Store for PgStore {
    async fn health_check(&self) -> Result<bool, RentalError> {
        Ok(common::database::health_check(&self.pool).await?)
    }

    async fn insert_property(&self, property: &Property) -> Result<(), RentalError> {
        sqlx::query(
            r#"
            INSERT INTO properties (id, host_id, title, description, address_street,
                                    address_city, address_state, address_zip_code,
                                    address_country, latitude, longitude, property_type,
                                    room_category, price_per_night, max_guests, num_bedrooms,
                                    num_beds, num_bathrooms, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                    $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(property.id)
        .bind(property.host_id)
        .bind(&property.title)
        .bind(&property.description)
        .bind(&property.address_street)
        .bind(&property.address_city)
        .bind(&property.address_state)
        .bind(&property.address_zip_code)
        .bind(&property.address_country)
        .bind(property.latitude)
        .bind(property.longitude)
        .bind(&property.property_type)
        .bind(&property.room_category)
        .bind(property.price_per_night)
        .bind(property.max_guests)
        .bind(property.num_bedrooms)
        .bind(property.num_beds)
        .bind(property.num_bathrooms)
        .bind(property.created_at)
        .bind(property.updated_at)
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        debug!("Inserted property {}", property.id);
        Ok(())
    }

    async fn property(&self, id: PropertyId) -> Result<Option<Property>, RentalError> {
        let row = sqlx::query("SELECT * FROM properties WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(property_from_row).transpose()?)
    }

    async fn properties(&self) -> Result<Vec<Property>, RentalError> {
        let rows = sqlx::query("SELECT * FROM properties ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        collect(rows, property_from_row)
    }

    async fn properties_by_host(&self, host: UserId) -> Result<Vec<Property>, RentalError> {
        let rows = sqlx::query("SELECT * FROM properties WHERE host_id = $1 ORDER BY created_at")
            .bind(host)
            .fetch_all(&self.pool)
            .await?;
        collect(rows, property_from_row)
    }

    async fn update_property(
        &self,
        id: PropertyId,
        changes: &PropertyUpdate,
    ) -> Result<Option<Property>, RentalError> {
        let mut tx = self.pool.begin().await?;

        let Some(row) = sqlx::query("SELECT * FROM properties WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };
        let mut property = property_from_row(&row)?;
        changes.apply(&mut property);

        sqlx::query(
            r#"
            UPDATE properties
            SET title = $2, description = $3, property_type = $4, room_category = $5,
                price_per_night = $6, max_guests = $7, num_bedrooms = $8, num_beds = $9,
                num_bathrooms = $10, updated_at = $11
            WHERE id = $1
            "#,
        )
        .bind(property.id)
        .bind(&property.title)
        .bind(&property.description)
        .bind(&property.property_type)
        .bind(&property.room_category)
        .bind(property.price_per_night)
        .bind(property.max_guests)
        .bind(property.num_bedrooms)
        .bind(property.num_beds)
        .bind(property.num_bathrooms)
        .bind(property.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(property))
    }

    async fn insert_block(
        &self,
        block: &AvailabilityBlock,
        event: DomainEvent,
    ) -> Result<(), RentalError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO availability_blocks (id, property_id, start_date, end_date,
                                             is_available, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(block.id)
        .bind(block.property_id)
        .bind(block.start_date)
        .bind(block.end_date)
        .bind(block.is_available)
        .bind(block.created_at)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        append_event(&mut tx, &event).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn block(&self, id: BlockId) -> Result<Option<AvailabilityBlock>, RentalError> {
        let row = sqlx::query("SELECT * FROM availability_blocks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(block_from_row).transpose()?)
    }

    async fn blocks_for_property(
        &self,
        property: PropertyId,
    ) -> Result<Vec<AvailabilityBlock>, RentalError> {
        let rows = sqlx::query(
            "SELECT * FROM availability_blocks WHERE property_id = $1 ORDER BY start_date, end_date",
        )
        .bind(property)
        .fetch_all(&self.pool)
        .await?;
        collect(rows, block_from_row)
    }

    async fn delete_block(&self, id: BlockId, event: DomainEvent) -> Result<bool, RentalError> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM availability_blocks WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Ok(false);
        }

        append_event(&mut tx, &event).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn is_blocked(&self, property: PropertyId, range: StayRange) -> Result<bool, RentalError> {
        let blocked: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM availability_blocks
                WHERE property_id = $1 AND NOT is_available
                  AND start_date < $3 AND end_date > $2
            )
            "#,
        )
        .bind(property)
        .bind(range.start())
        .bind(range.end())
        .fetch_one(&self.pool)
        .await?;
        Ok(blocked)
    }

    async fn reserve(
        &self,
        property: PropertyId,
        check_in: NaiveDate,
        check_out: NaiveDate,
        plan: &Planner<'_>,
    ) -> Result<Booking, RentalError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM properties WHERE id = $1 FOR UPDATE")
            .bind(property)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(RentalError::NotFound("property"))?;
        let property = property_from_row(&row)?;

        let rows = sqlx::query(
            r#"
            SELECT * FROM bookings
            WHERE property_id = $1 AND status <> 'cancelled'
              AND check_in_date < $3 AND check_out_date > $2
            "#,
        )
        .bind(property.id)
        .bind(check_in)
        .bind(check_out)
        .fetch_all(&mut *tx)
        .await?;
        let overlapping = collect(rows, booking_from_row)?;

        let blocked: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM availability_blocks
                WHERE property_id = $1 AND NOT is_available
                  AND start_date < $3 AND end_date > $2
            )
            "#,
        )
        .bind(property.id)
        .bind(check_in)
        .bind(check_out)
        .fetch_one(&mut *tx)
        .await?;

        let snapshot = ReservationSnapshot {
            property,
            overlapping,
            blocked,
        };
        let booking = plan(&snapshot)?;

        insert_booking(&mut tx, &booking).await?;
        append_event(&mut tx, &DomainEvent::booking_created(&booking)).await?;
        tx.commit().await?;

        Ok(booking)
    }

    async fn booking(&self, id: BookingId) -> Result<Option<Booking>, RentalError> {
        let row = sqlx::query("SELECT * FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(booking_from_row).transpose()?)
    }

    async fn booking_by_session(&self, session: &str) -> Result<Option<Booking>, RentalError> {
        let row = sqlx::query("SELECT * FROM bookings WHERE payment_session = $1")
            .bind(session)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(booking_from_row).transpose()?)
    }

    async fn bookings_for_guest(&self, guest: UserId) -> Result<Vec<Booking>, RentalError> {
        let rows = sqlx::query(
            "SELECT * FROM bookings WHERE guest_id = $1 ORDER BY check_in_date, created_at",
        )
        .bind(guest)
        .fetch_all(&self.pool)
        .await?;
        collect(rows, booking_from_row)
    }

    async fn bookings_for_property(
        &self,
        property: PropertyId,
    ) -> Result<Vec<Booking>, RentalError> {
        let rows = sqlx::query(
            "SELECT * FROM bookings WHERE property_id = $1 ORDER BY check_in_date, created_at",
        )
        .bind(property)
        .fetch_all(&self.pool)
        .await?;
        collect(rows, booking_from_row)
    }

    async fn bookings_for_host(&self, host: UserId) -> Result<Vec<Booking>, RentalError> {
        let rows = sqlx::query(
            r#"
            SELECT b.* FROM bookings b
            JOIN properties p ON p.id = b.property_id
            WHERE p.host_id = $1
            ORDER BY b.check_in_date, b.created_at
            "#,
        )
        .bind(host)
        .fetch_all(&self.pool)
        .await?;
        collect(rows, booking_from_row)
    }

    async fn bookings_awaiting_payment(&self) -> Result<Vec<Booking>, RentalError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM bookings
            WHERE status = 'pending' AND payment_session IS NOT NULL
            ORDER BY check_in_date, created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        collect(rows, booking_from_row)
    }

    async fn set_payment_session(
        &self,
        id: BookingId,
        session: &str,
        event: DomainEvent,
    ) -> Result<Booking, RentalError> {
        let mut tx = self.pool.begin().await?;
        let mut booking = lock_booking(&mut tx, id).await?;

        if booking.status != BookingStatus::Pending {
            return Err(RentalError::InvalidState(format!(
                "only pending bookings can be paid (booking is {})",
                booking.status
            )));
        }

        booking.payment_session = Some(session.to_string());
        booking.updated_at = chrono::Utc::now();
        save_booking_state(&mut tx, &booking).await?;
        append_event(&mut tx, &event).await?;
        tx.commit().await?;

        Ok(booking)
    }

    async fn transition_booking(
        &self,
        id: BookingId,
        from: &[BookingStatus],
        to: BookingStatus,
        event: DomainEvent,
    ) -> Result<Booking, RentalError> {
        let mut tx = self.pool.begin().await?;
        let mut booking = lock_booking(&mut tx, id).await?;

        if !from.contains(&booking.status) {
            return Err(RentalError::InvalidState(format!(
                "booking is {} and cannot become {}",
                booking.status, to
            )));
        }

        booking.status = to;
        booking.updated_at = chrono::Utc::now();
        save_booking_state(&mut tx, &booking).await?;
        append_event(&mut tx, &event).await?;
        tx.commit().await?;

        Ok(booking)
    }

    async fn insert_review(&self, review: &Review, event: DomainEvent) -> Result<(), RentalError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO reviews (id, booking_id, guest_id, property_id, rating, comment, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(review.id)
        .bind(review.booking_id)
        .bind(review.guest_id)
        .bind(review.property_id)
        .bind(review.rating)
        .bind(&review.comment)
        .bind(review.created_at)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        append_event(&mut tx, &event).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn review_for_booking(&self, booking: BookingId) -> Result<Option<Review>, RentalError> {
        let row = sqlx::query("SELECT * FROM reviews WHERE booking_id = $1")
            .bind(booking)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(review_from_row).transpose()?)
    }

    async fn reviews_for_property(&self, property: PropertyId) -> Result<Vec<Review>, RentalError> {
        let rows =
            sqlx::query("SELECT * FROM reviews WHERE property_id = $1 ORDER BY created_at DESC")
                .bind(property)
                .fetch_all(&self.pool)
                .await?;
        collect(rows, review_from_row)
    }

    async fn reviews_by_guest(&self, guest: UserId) -> Result<Vec<Review>, RentalError> {
        let rows = sqlx::query("SELECT * FROM reviews WHERE guest_id = $1 ORDER BY created_at DESC")
            .bind(guest)
            .fetch_all(&self.pool)
            .await?;
        collect(rows, review_from_row)
    }

    async fn insert_cohost(&self, cohost: &CoHost, event: DomainEvent) -> Result<(), RentalError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO cohosts (id, property_id, user_id, role, can_manage_bookings,
                                 can_manage_calendar, can_manage_listing, can_manage_finances,
                                 can_manage_messages, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(cohost.id)
        .bind(cohost.property_id)
        .bind(cohost.user_id)
        .bind(cohost.role.as_str())
        .bind(cohost.can_manage_bookings)
        .bind(cohost.can_manage_calendar)
        .bind(cohost.can_manage_listing)
        .bind(cohost.can_manage_finances)
        .bind(cohost.can_manage_messages)
        .bind(cohost.created_at)
        .bind(cohost.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        append_event(&mut tx, &event).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn cohost(&self, id: CoHostId) -> Result<Option<CoHost>, RentalError> {
        let row = sqlx::query("SELECT * FROM cohosts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(cohost_from_row).transpose()?)
    }

    async fn cohost_for(
        &self,
        property: PropertyId,
        user: UserId,
    ) -> Result<Option<CoHost>, RentalError> {
        let row = sqlx::query("SELECT * FROM cohosts WHERE property_id = $1 AND user_id = $2")
            .bind(property)
            .bind(user)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(cohost_from_row).transpose()?)
    }

    async fn cohosts_for_property(&self, property: PropertyId) -> Result<Vec<CoHost>, RentalError> {
        let rows =
            sqlx::query("SELECT * FROM cohosts WHERE property_id = $1 ORDER BY created_at DESC")
                .bind(property)
                .fetch_all(&self.pool)
                .await?;
        collect(rows, cohost_from_row)
    }

    async fn cohosted_properties(&self, user: UserId) -> Result<Vec<Property>, RentalError> {
        let rows = sqlx::query(
            r#"
            SELECT p.* FROM properties p
            JOIN cohosts c ON c.property_id = p.id
            WHERE c.user_id = $1
            ORDER BY p.created_at
            "#,
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;
        collect(rows, property_from_row)
    }

    async fn update_cohost(
        &self,
        id: CoHostId,
        changes: &CoHostUpdate,
        event: DomainEvent,
    ) -> Result<Option<CoHost>, RentalError> {
        let mut tx = self.pool.begin().await?;

        let Some(row) = sqlx::query("SELECT * FROM cohosts WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };
        let mut cohost = cohost_from_row(&row)?;
        changes.apply(&mut cohost);

        sqlx::query(
            r#"
            UPDATE cohosts
            SET role = $2, can_manage_bookings = $3, can_manage_calendar = $4,
                can_manage_listing = $5, can_manage_finances = $6, can_manage_messages = $7,
                updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(cohost.id)
        .bind(cohost.role.as_str())
        .bind(cohost.can_manage_bookings)
        .bind(cohost.can_manage_calendar)
        .bind(cohost.can_manage_listing)
        .bind(cohost.can_manage_finances)
        .bind(cohost.can_manage_messages)
        .bind(cohost.updated_at)
        .execute(&mut *tx)
        .await?;

        append_event(&mut tx, &event).await?;
        tx.commit().await?;
        Ok(Some(cohost))
    }

    async fn delete_cohost(&self, id: CoHostId, event: DomainEvent) -> Result<bool, RentalError> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM cohosts WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Ok(false);
        }

        append_event(&mut tx, &event).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn insert_contract(
        &self,
        contract: &Contract,
        event: DomainEvent,
    ) -> Result<(), RentalError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO contracts (id, created_by, title, content, customer_name, customer_email,
                                   customer_phone, customer_number, status, sent_at, signed_at,
                                   signer_name, expiration_date, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(contract.id)
        .bind(contract.created_by)
        .bind(&contract.title)
        .bind(&contract.content)
        .bind(&contract.customer_name)
        .bind(&contract.customer_email)
        .bind(contract.customer_phone.as_deref())
        .bind(&contract.customer_number)
        .bind(contract.status.as_str())
        .bind(contract.sent_at)
        .bind(contract.signed_at)
        .bind(contract.signer_name.as_deref())
        .bind(contract.expiration_date)
        .bind(contract.created_at)
        .bind(contract.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        append_event(&mut tx, &event).await?;
        tx.commit().await?;
        debug!("Inserted contract {}", contract.id);
        Ok(())
    }

    async fn contract(&self, id: ContractId) -> Result<Option<Contract>, RentalError> {
        let row = sqlx::query("SELECT * FROM contracts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(contract_from_row).transpose()?)
    }

    async fn contracts_by_creator(&self, user: UserId) -> Result<Vec<Contract>, RentalError> {
        let rows =
            sqlx::query("SELECT * FROM contracts WHERE created_by = $1 ORDER BY created_at DESC")
                .bind(user)
                .fetch_all(&self.pool)
                .await?;
        collect(rows, contract_from_row)
    }

    async fn save_contract(
        &self,
        contract: &Contract,
        from: ContractStatus,
        event: DomainEvent,
    ) -> Result<(), RentalError> {
        let mut tx = self.pool.begin().await?;

        let stored: String = sqlx::query("SELECT status FROM contracts WHERE id = $1 FOR UPDATE")
            .bind(contract.id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(RentalError::NotFound("contract"))?
            .try_get("status")?;
        if stored != from.as_str() {
            return Err(RentalError::InvalidState(format!(
                "contract is {} and cannot become {}",
                stored, contract.status
            )));
        }

        sqlx::query(
            r#"
            UPDATE contracts
            SET status = $2, sent_at = $3, signed_at = $4, signer_name = $5,
                expiration_date = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(contract.id)
        .bind(contract.status.as_str())
        .bind(contract.sent_at)
        .bind(contract.signed_at)
        .bind(contract.signer_name.as_deref())
        .bind(contract.expiration_date)
        .bind(contract.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        append_event(&mut tx, &event).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_reminder(
        &self,
        reminder: &ContractReminder,
        event: DomainEvent,
    ) -> Result<(), RentalError> {
        let mut tx = self.pool.begin().await?;

        let status: String = sqlx::query("SELECT status FROM contracts WHERE id = $1 FOR SHARE")
            .bind(reminder.contract_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(RentalError::NotFound("contract"))?
            .try_get("status")?;
        if status != ContractStatus::Sent.as_str() {
            return Err(RentalError::InvalidState(
                "reminders can only be sent for contracts awaiting signature".to_string(),
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO contract_reminders (id, contract_id, sent_by, notes, sent_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(reminder.id)
        .bind(reminder.contract_id)
        .bind(reminder.sent_by)
        .bind(&reminder.notes)
        .bind(reminder.sent_at)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        append_event(&mut tx, &event).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn reminders_for_contract(
        &self,
        contract: ContractId,
    ) -> Result<Vec<ContractReminder>, RentalError> {
        let rows = sqlx::query(
            "SELECT * FROM contract_reminders WHERE contract_id = $1 ORDER BY sent_at DESC",
        )
        .bind(contract)
        .fetch_all(&self.pool)
        .await?;
        collect(rows, reminder_from_row)
    }

    async fn insert_regulation(
        &self,
        regulation: &Regulation,
        event: DomainEvent,
    ) -> Result<(), RentalError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO regulations (id, created_by, property_id, title, description, body,
                                     document_name, document_type, status, effective_date,
                                     expiration_date, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(regulation.id)
        .bind(regulation.created_by)
        .bind(regulation.property_id)
        .bind(&regulation.title)
        .bind(&regulation.description)
        .bind(&regulation.body)
        .bind(regulation.document_name.as_deref())
        .bind(regulation.document_type.as_str())
        .bind(regulation.status.as_str())
        .bind(regulation.effective_date)
        .bind(regulation.expiration_date)
        .bind(regulation.created_at)
        .bind(regulation.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        append_event(&mut tx, &event).await?;
        tx.commit().await?;
        debug!("Inserted regulation {}", regulation.id);
        Ok(())
    }

    async fn regulation(&self, id: RegulationId) -> Result<Option<Regulation>, RentalError> {
        let row = sqlx::query("SELECT * FROM regulations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(regulation_from_row).transpose()?)
    }

    async fn regulations(
        &self,
        filter: &RegulationFilter,
    ) -> Result<Vec<Regulation>, RentalError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM regulations
            WHERE ($1::uuid IS NULL OR property_id = $1)
              AND ($2::text IS NULL OR document_type = $2)
              AND ($3::text IS NULL OR status = $3)
            ORDER BY created_at DESC
            "#,
        )
        .bind(filter.property_id)
        .bind(filter.document_type.map(|kind| kind.as_str()))
        .bind(filter.status.map(|status| status.as_str()))
        .fetch_all(&self.pool)
        .await?;
        collect(rows, regulation_from_row)
    }

    async fn update_regulation(
        &self,
        regulation: &Regulation,
        event: DomainEvent,
    ) -> Result<(), RentalError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE regulations
            SET title = $2, description = $3, body = $4, document_name = $5,
                document_type = $6, status = $7, effective_date = $8, expiration_date = $9,
                updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(regulation.id)
        .bind(&regulation.title)
        .bind(&regulation.description)
        .bind(&regulation.body)
        .bind(regulation.document_name.as_deref())
        .bind(regulation.document_type.as_str())
        .bind(regulation.status.as_str())
        .bind(regulation.effective_date)
        .bind(regulation.expiration_date)
        .bind(regulation.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;
        if updated.rows_affected() == 0 {
            return Err(RentalError::NotFound("regulation"));
        }

        append_event(&mut tx, &event).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn send_regulation(
        &self,
        regulation: RegulationId,
        users: &[UserId],
        sent_at: DateTime<Utc>,
        event: DomainEvent,
    ) -> Result<Vec<RegulationRecipient>, RentalError> {
        let mut tx = self.pool.begin().await?;

        if sqlx::query("SELECT id FROM regulations WHERE id = $1 FOR SHARE")
            .bind(regulation)
            .fetch_optional(&mut *tx)
            .await?
            .is_none()
        {
            return Err(RentalError::NotFound("regulation"));
        }

        let mut delivered = Vec::with_capacity(users.len());
        for user in users {
            let fresh = RegulationRecipient::new(regulation, *user, sent_at);
            let row = sqlx::query(
                r#"
                INSERT INTO regulation_recipients (id, regulation_id, user_id, sent_at,
                                                   viewed_at, acknowledged, acknowledged_at)
                VALUES ($1, $2, $3, $4, NULL, FALSE, NULL)
                ON CONFLICT ON CONSTRAINT regulation_recipients_regulation_user_key
                DO UPDATE SET sent_at = EXCLUDED.sent_at
                RETURNING *
                "#,
            )
            .bind(fresh.id)
            .bind(fresh.regulation_id)
            .bind(fresh.user_id)
            .bind(fresh.sent_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(classify)?;
            delivered.push(recipient_from_row(&row)?);
        }

        append_event(&mut tx, &event).await?;
        tx.commit().await?;
        Ok(delivered)
    }

    async fn recipient(&self, id: RecipientId) -> Result<Option<RegulationRecipient>, RentalError> {
        let row = sqlx::query("SELECT * FROM regulation_recipients WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(recipient_from_row).transpose()?)
    }

    async fn recipients_for_regulation(
        &self,
        regulation: RegulationId,
    ) -> Result<Vec<RegulationRecipient>, RentalError> {
        let rows = sqlx::query(
            "SELECT * FROM regulation_recipients WHERE regulation_id = $1 ORDER BY sent_at DESC",
        )
        .bind(regulation)
        .fetch_all(&self.pool)
        .await?;
        collect(rows, recipient_from_row)
    }

    async fn recipients_for_user(
        &self,
        user: UserId,
    ) -> Result<Vec<RegulationRecipient>, RentalError> {
        let rows = sqlx::query(
            "SELECT * FROM regulation_recipients WHERE user_id = $1 ORDER BY sent_at DESC",
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;
        collect(rows, recipient_from_row)
    }

    async fn save_recipient(
        &self,
        recipient: &RegulationRecipient,
        event: DomainEvent,
    ) -> Result<(), RentalError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE regulation_recipients
            SET viewed_at = $2, acknowledged = $3, acknowledged_at = $4
            WHERE id = $1
            "#,
        )
        .bind(recipient.id)
        .bind(recipient.viewed_at)
        .bind(recipient.acknowledged)
        .bind(recipient.acknowledged_at)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(RentalError::NotFound("regulation recipient"));
        }

        append_event(&mut tx, &event).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn undelivered_events(&self, limit: usize) -> Result<Vec<OutboxRecord>, RentalError> {
        let rows = sqlx::query(
            r#"
            SELECT seq, payload, created_at FROM outbox_events
            WHERE delivered_at IS NULL
            ORDER BY seq
            LIMIT $1
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<OutboxRecord, RentalError> {
                let Json(event): Json<DomainEvent> = row.try_get("payload")?;
                Ok(OutboxRecord {
                    seq: row.try_get("seq")?,
                    event,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn mark_delivered(&self, seqs: &[i64]) -> Result<(), RentalError> {
        sqlx::query("UPDATE outbox_events SET delivered_at = NOW() WHERE seq = ANY($1)")
            .bind(seqs)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::{BookingPolicy, plan_booking};
    use crate::models::{BookingRequest, NewContract, NewProperty, NewRegulation};
    use chrono::Utc;
    use std::sync::Arc;
    use tokio::sync::Barrier;
    use common::database::{DatabaseConfig, init_pool, run_migrations};
    use rust_decimal_macros::dec;
    use serde_json::json;

    async fn store() -> PgStore {
        let pool = init_pool(&DatabaseConfig::from_env().unwrap()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        PgStore::new(pool)
    }

    fn listing() -> Property {
        let payload: NewProperty = serde_json::from_value(json!({
            "title": "Harbour loft",
            "address_street": "1 Quay Street",
            "address_city": "Lisbon",
            "address_state": "Lisboa",
            "address_zip_code": "1100-001",
            "address_country": "Portugal",
            "property_type": "apartment",
            "room_category": "entire_place",
            "price_per_night": "100.00",
            "max_guests": 4
        }))
        .unwrap();
        payload.into_property(UserId::new())
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn pending(property: &Property, check_in: NaiveDate, check_out: NaiveDate) -> Booking {
        let now = Utc::now();
        Booking {
            id: BookingId::new(),
            guest_id: UserId::new(),
            property_id: property.id,
            check_in_date: check_in,
            check_out_date: check_out,
            num_guests: 2,
            total_price: dec!(300.00),
            status: BookingStatus::Pending,
            payment_session: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL instance"]
    async fn property_roundtrips_through_postgres() {
        let store = store().await;
        let property = listing();
        store.insert_property(&property).await.unwrap();

        let loaded = store.property(property.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, property.title);
        assert_eq!(loaded.price_per_night, dec!(100.00));
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL instance"]
    async fn exclusion_constraint_surfaces_as_date_conflict() {
        let store = store().await;
        let property = listing();
        store.insert_property(&property).await.unwrap();

        let first = pending(&property, day(1), day(4));
        let mut tx = store.pool().begin().await.unwrap();
        insert_booking(&mut tx, &first).await.unwrap();
        tx.commit().await.unwrap();

        // Bypasses the planner: only the constraint stands in the way.
        let second = pending(&property, day(3), day(5));
        let mut tx = store.pool().begin().await.unwrap();
        let err = insert_booking(&mut tx, &second).await.unwrap_err();
        assert!(matches!(err, RentalError::DateConflict));
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL instance"]
    async fn reserve_records_outbox_event() {
        let store = store().await;
        let property = listing();
        store.insert_property(&property).await.unwrap();

        let planned = pending(&property, day(10), day(12));
        let expected = planned.id;
        let plan = move |snapshot: &ReservationSnapshot| -> Result<Booking, RentalError> {
            assert!(snapshot.overlapping.is_empty());
            Ok(planned.clone())
        };
        let booking = store
            .reserve(property.id, day(10), day(12), &plan)
            .await
            .unwrap();
        assert_eq!(booking.id, expected);

        let events = store.undelivered_events(1000).await.unwrap();
        assert!(events.iter().any(|r| matches!(
            r.event,
            DomainEvent::BookingCreated { booking_id, .. } if booking_id == booking.id
        )));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "requires a running PostgreSQL instance"]
    async fn racing_reservations_admit_exactly_one() {
        let store = Arc::new(store().await);
        let property = listing();
        store.insert_property(&property).await.unwrap();
        let barrier = Arc::new(Barrier::new(2));

        let mut handles = Vec::new();
        for (check_in, check_out) in [(day(20), day(23)), (day(21), day(24))] {
            let store = store.clone();
            let barrier = barrier.clone();
            let request = BookingRequest {
                property_id: property.id,
                check_in_date: check_in,
                check_out_date: check_out,
                num_guests: 2,
            };
            handles.push(tokio::spawn(async move {
                let policy = BookingPolicy::default();
                let guest = UserId::new();
                let plan = |snapshot: &ReservationSnapshot| -> Result<Booking, RentalError> {
                    plan_booking(guest, &request, snapshot, &policy, Utc::now())
                };
                barrier.wait().await;
                store
                    .reserve(
                        request.property_id,
                        request.check_in_date,
                        request.check_out_date,
                        &plan,
                    )
                    .await
            }));
        }

        let mut won = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => won += 1,
                Err(RentalError::DateConflict) => conflicts += 1,
                Err(e) => panic!("unexpected reservation error: {}", e),
            }
        }
        assert_eq!((won, conflicts), (1, 1));

        let stored = store.bookings_for_property(property.id).await.unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL instance"]
    async fn resending_a_regulation_refreshes_the_existing_row() {
        let store = store().await;
        let regulation = NewRegulation {
            title: "Quiet hours".to_string(),
            ..Default::default()
        }
        .into_regulation(UserId::new(), Utc::now());
        let event = DomainEvent::RegulationCreated {
            regulation_id: regulation.id,
            property_id: None,
            status: regulation.status,
        };
        store.insert_regulation(&regulation, event).await.unwrap();

        let tenant = UserId::new();
        let sent = |users: Vec<UserId>| DomainEvent::RegulationSent {
            regulation_id: regulation.id,
            user_ids: users,
        };
        let first = store
            .send_regulation(regulation.id, &[tenant], Utc::now(), sent(vec![tenant]))
            .await
            .unwrap();
        let again = store
            .send_regulation(regulation.id, &[tenant], Utc::now(), sent(vec![tenant]))
            .await
            .unwrap();

        assert_eq!(first[0].id, again[0].id);
        assert!(again[0].sent_at >= first[0].sent_at);
        assert_eq!(store.recipients_for_regulation(regulation.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL instance"]
    async fn customer_number_is_unique() {
        let store = store().await;
        let number = format!("C-{}", uuid::Uuid::new_v4());
        let draft = || {
            NewContract {
                title: "Summer lease".to_string(),
                content: "Terms".to_string(),
                customer_name: "Ada Moreau".to_string(),
                customer_email: "ada@example.com".to_string(),
                customer_phone: None,
                customer_number: number.clone(),
            }
            .into_contract(UserId::new(), Utc::now())
        };

        let first = draft();
        store
            .insert_contract(&first, DomainEvent::contract_created(&first))
            .await
            .unwrap();
        let second = draft();
        let err = store
            .insert_contract(&second, DomainEvent::contract_created(&second))
            .await
            .unwrap_err();
        assert!(matches!(err, RentalError::Conflict(_)));
    }
}
