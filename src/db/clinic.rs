use crate::db::models::{
    Appointment, AppointmentPatch, AppointmentStatus, Invoice, InvoicePatch, InvoiceStatus,
    NewAppointment, NewInvoice, NewPatient, NewPet, Patient, PatientDeletion, PatientPatch, Pet,
    PetPatch,
};
use crate::db::sqlite::{Storage, check_opt, now, require_non_empty, require_non_negative};
use crate::error::VetdeskError;
use tracing::{debug, info};

impl Storage {
    // --- patients -----------------------------------------------------------

    pub async fn create_patient(&self, new: NewPatient) -> Result<Patient, VetdeskError> {
        require_non_empty("name", &new.name)?;
        let ts = now();
        let patient = sqlx::query_as::<_, Patient>(
            r#"INSERT INTO patients (name, email, phone, address, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)
               RETURNING *"#,
        )
        .bind(new.name)
        .bind(new.email)
        .bind(new.phone)
        .bind(new.address)
        .bind(ts)
        .bind(ts)
        .fetch_one(self.pool())
        .await?;
        debug!(patient_id = patient.id, "patient created");
        Ok(patient)
    }

    pub async fn get_patient(&self, id: i64) -> Result<Patient, VetdeskError> {
        sqlx::query_as::<_, Patient>("SELECT * FROM patients WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| VetdeskError::not_found("patient", id))
    }

    pub async fn list_patients(&self) -> Result<Vec<Patient>, VetdeskError> {
        let rows = sqlx::query_as::<_, Patient>("SELECT * FROM patients ORDER BY name, id")
            .fetch_all(self.pool())
            .await?;
        Ok(rows)
    }

    pub async fn update_patient(
        &self,
        id: i64,
        patch: PatientPatch,
    ) -> Result<Patient, VetdeskError> {
        check_opt(patch.name.as_deref(), |n| require_non_empty("name", n))?;
        sqlx::query_as::<_, Patient>(
            r#"UPDATE patients SET
                name = COALESCE(?, name),
                email = COALESCE(?, email),
                phone = COALESCE(?, phone),
                address = COALESCE(?, address),
                updated_at = ?
              WHERE id = ?
              RETURNING *"#,
        )
        .bind(patch.name)
        .bind(patch.email)
        .bind(patch.phone)
        .bind(patch.address)
        .bind(now())
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| VetdeskError::not_found("patient", id))
    }

    /// Delete a patient together with its pets, their appointments and the
    /// patient's invoices, in one transaction.
    pub async fn delete_patient(&self, id: i64) -> Result<PatientDeletion, VetdeskError> {
        let mut tx = self.pool().begin().await?;

        let invoices = sqlx::query("DELETE FROM invoices WHERE patient_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let appointments = sqlx::query(
            "DELETE FROM appointments WHERE pet_id IN (SELECT id FROM pets WHERE patient_id = ?)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        let pets = sqlx::query("DELETE FROM pets WHERE patient_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let removed = sqlx::query("DELETE FROM patients WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if removed == 0 {
            return Err(VetdeskError::not_found("patient", id));
        }

        tx.commit().await?;
        info!(
            patient_id = id,
            pets, appointments, invoices, "patient deleted with dependents"
        );
        Ok(PatientDeletion {
            pets,
            appointments,
            invoices,
        })
    }

    // --- pets ---------------------------------------------------------------

    pub async fn create_pet(&self, new: NewPet) -> Result<Pet, VetdeskError> {
        require_non_empty("name", &new.name)?;
        require_non_empty("species", &new.species)?;
        validate_weight(new.weight_kg)?;
        self.ensure_exists("patients", "patient", new.patient_id)
            .await?;
        let ts = now();
        let pet = sqlx::query_as::<_, Pet>(
            r#"INSERT INTO pets (
                patient_id, name, species, breed, birth_date, weight_kg, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *"#,
        )
        .bind(new.patient_id)
        .bind(new.name)
        .bind(new.species)
        .bind(new.breed)
        .bind(new.birth_date)
        .bind(new.weight_kg)
        .bind(ts)
        .bind(ts)
        .fetch_one(self.pool())
        .await?;
        Ok(pet)
    }

    pub async fn get_pet(&self, id: i64) -> Result<Pet, VetdeskError> {
        sqlx::query_as::<_, Pet>("SELECT * FROM pets WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| VetdeskError::not_found("pet", id))
    }

    pub async fn list_pets(&self, patient_id: i64) -> Result<Vec<Pet>, VetdeskError> {
        let rows = sqlx::query_as::<_, Pet>("SELECT * FROM pets WHERE patient_id = ? ORDER BY id")
            .bind(patient_id)
            .fetch_all(self.pool())
            .await?;
        Ok(rows)
    }

    pub async fn update_pet(&self, id: i64, patch: PetPatch) -> Result<Pet, VetdeskError> {
        check_opt(patch.name.as_deref(), |n| require_non_empty("name", n))?;
        check_opt(patch.species.as_deref(), |s| require_non_empty("species", s))?;
        validate_weight(patch.weight_kg)?;
        sqlx::query_as::<_, Pet>(
            r#"UPDATE pets SET
                name = COALESCE(?, name),
                species = COALESCE(?, species),
                breed = COALESCE(?, breed),
                birth_date = COALESCE(?, birth_date),
                weight_kg = COALESCE(?, weight_kg),
                updated_at = ?
              WHERE id = ?
              RETURNING *"#,
        )
        .bind(patch.name)
        .bind(patch.species)
        .bind(patch.breed)
        .bind(patch.birth_date)
        .bind(patch.weight_kg)
        .bind(now())
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| VetdeskError::not_found("pet", id))
    }

    /// Delete a pet and its appointments. Returns the number of appointments removed.
    pub async fn delete_pet(&self, id: i64) -> Result<u64, VetdeskError> {
        let mut tx = self.pool().begin().await?;
        let appointments = sqlx::query("DELETE FROM appointments WHERE pet_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let removed = sqlx::query("DELETE FROM pets WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if removed == 0 {
            return Err(VetdeskError::not_found("pet", id));
        }
        tx.commit().await?;
        Ok(appointments)
    }

    // --- appointments -------------------------------------------------------

    pub async fn create_appointment(
        &self,
        new: NewAppointment,
    ) -> Result<Appointment, VetdeskError> {
        require_non_empty("reason", &new.reason)?;
        self.ensure_exists("pets", "pet", new.pet_id).await?;
        if let Some(employee_id) = new.employee_id {
            self.ensure_exists("employees", "employee", employee_id)
                .await?;
        }
        let ts = now();
        let appointment = sqlx::query_as::<_, Appointment>(
            r#"INSERT INTO appointments (
                pet_id, employee_id, scheduled_at, reason, status, notes, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *"#,
        )
        .bind(new.pet_id)
        .bind(new.employee_id)
        .bind(new.scheduled_at)
        .bind(new.reason)
        .bind(AppointmentStatus::Scheduled)
        .bind(new.notes)
        .bind(ts)
        .bind(ts)
        .fetch_one(self.pool())
        .await?;
        Ok(appointment)
    }

    pub async fn get_appointment(&self, id: i64) -> Result<Appointment, VetdeskError> {
        sqlx::query_as::<_, Appointment>("SELECT * FROM appointments WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| VetdeskError::not_found("appointment", id))
    }

    pub async fn list_appointments_for_pet(
        &self,
        pet_id: i64,
    ) -> Result<Vec<Appointment>, VetdeskError> {
        let rows = sqlx::query_as::<_, Appointment>(
            "SELECT * FROM appointments WHERE pet_id = ? ORDER BY scheduled_at, id",
        )
        .bind(pet_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn list_appointments_for_employee(
        &self,
        employee_id: i64,
    ) -> Result<Vec<Appointment>, VetdeskError> {
        let rows = sqlx::query_as::<_, Appointment>(
            "SELECT * FROM appointments WHERE employee_id = ? ORDER BY scheduled_at, id",
        )
        .bind(employee_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn update_appointment(
        &self,
        id: i64,
        patch: AppointmentPatch,
    ) -> Result<Appointment, VetdeskError> {
        check_opt(patch.reason.as_deref(), |r| require_non_empty("reason", r))?;
        if let Some(employee_id) = patch.employee_id {
            self.ensure_exists("employees", "employee", employee_id)
                .await?;
        }
        sqlx::query_as::<_, Appointment>(
            r#"UPDATE appointments SET
                employee_id = COALESCE(?, employee_id),
                scheduled_at = COALESCE(?, scheduled_at),
                reason = COALESCE(?, reason),
                status = COALESCE(?, status),
                notes = COALESCE(?, notes),
                updated_at = ?
              WHERE id = ?
              RETURNING *"#,
        )
        .bind(patch.employee_id)
        .bind(patch.scheduled_at)
        .bind(patch.reason)
        .bind(patch.status)
        .bind(patch.notes)
        .bind(now())
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| VetdeskError::not_found("appointment", id))
    }

    pub async fn delete_appointment(&self, id: i64) -> Result<(), VetdeskError> {
        let removed = sqlx::query("DELETE FROM appointments WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?
            .rows_affected();
        if removed == 0 {
            return Err(VetdeskError::not_found("appointment", id));
        }
        Ok(())
    }

    // --- invoices -----------------------------------------------------------

    pub async fn create_invoice(&self, new: NewInvoice) -> Result<Invoice, VetdeskError> {
        require_non_negative("amount_cents", new.amount_cents)?;
        self.ensure_exists("patients", "patient", new.patient_id)
            .await?;
        if let Some(appointment_id) = new.appointment_id {
            self.ensure_exists("appointments", "appointment", appointment_id)
                .await?;
        }
        let ts = now();
        let invoice = sqlx::query_as::<_, Invoice>(
            r#"INSERT INTO invoices (
                patient_id, appointment_id, amount_cents, status, due_on, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING *"#,
        )
        .bind(new.patient_id)
        .bind(new.appointment_id)
        .bind(new.amount_cents)
        .bind(InvoiceStatus::Draft)
        .bind(new.due_on)
        .bind(ts)
        .bind(ts)
        .fetch_one(self.pool())
        .await?;
        Ok(invoice)
    }

    pub async fn get_invoice(&self, id: i64) -> Result<Invoice, VetdeskError> {
        sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| VetdeskError::not_found("invoice", id))
    }

    pub async fn list_invoices(&self, patient_id: i64) -> Result<Vec<Invoice>, VetdeskError> {
        let rows = sqlx::query_as::<_, Invoice>(
            "SELECT * FROM invoices WHERE patient_id = ? ORDER BY created_at, id",
        )
        .bind(patient_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn update_invoice(
        &self,
        id: i64,
        patch: InvoicePatch,
    ) -> Result<Invoice, VetdeskError> {
        check_opt(patch.amount_cents, |a| require_non_negative("amount_cents", a))?;
        sqlx::query_as::<_, Invoice>(
            r#"UPDATE invoices SET
                amount_cents = COALESCE(?, amount_cents),
                status = COALESCE(?, status),
                due_on = COALESCE(?, due_on),
                updated_at = ?
              WHERE id = ?
              RETURNING *"#,
        )
        .bind(patch.amount_cents)
        .bind(patch.status)
        .bind(patch.due_on)
        .bind(now())
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| VetdeskError::not_found("invoice", id))
    }

    pub async fn delete_invoice(&self, id: i64) -> Result<(), VetdeskError> {
        let removed = sqlx::query("DELETE FROM invoices WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?
            .rows_affected();
        if removed == 0 {
            return Err(VetdeskError::not_found("invoice", id));
        }
        Ok(())
    }
}

fn validate_weight(weight_kg: Option<f64>) -> Result<(), VetdeskError> {
    match weight_kg {
        Some(w) if !w.is_finite() || w <= 0.0 => Err(VetdeskError::validation(
            "weight_kg must be a positive number",
        )),
        _ => Ok(()),
    }
}
