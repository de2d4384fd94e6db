use crate::db::models::{
    Employee, EmployeeDeletion, EmployeePatch, NewEmployee, NewPayroll, Payroll, PayrollPatch,
};
use crate::db::sqlite::{Storage, check_opt, now, require_non_empty, require_non_negative};
use crate::error::VetdeskError;
use tracing::info;

impl Storage {
    pub async fn create_employee(&self, new: NewEmployee) -> Result<Employee, VetdeskError> {
        require_non_empty("name", &new.name)?;
        require_non_empty("role", &new.role)?;
        require_non_negative("salary_cents", new.salary_cents)?;
        let ts = now();
        let employee = sqlx::query_as::<_, Employee>(
            r#"INSERT INTO employees (
                name, role, email, salary_cents, hired_on, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING *"#,
        )
        .bind(new.name)
        .bind(new.role)
        .bind(new.email)
        .bind(new.salary_cents)
        .bind(new.hired_on)
        .bind(ts)
        .bind(ts)
        .fetch_one(self.pool())
        .await?;
        Ok(employee)
    }

    pub async fn get_employee(&self, id: i64) -> Result<Employee, VetdeskError> {
        sqlx::query_as::<_, Employee>("SELECT * FROM employees WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| VetdeskError::not_found("employee", id))
    }

    pub async fn list_employees(&self) -> Result<Vec<Employee>, VetdeskError> {
        let rows = sqlx::query_as::<_, Employee>("SELECT * FROM employees ORDER BY name, id")
            .fetch_all(self.pool())
            .await?;
        Ok(rows)
    }

    pub async fn update_employee(
        &self,
        id: i64,
        patch: EmployeePatch,
    ) -> Result<Employee, VetdeskError> {
        check_opt(patch.name.as_deref(), |n| require_non_empty("name", n))?;
        check_opt(patch.role.as_deref(), |r| require_non_empty("role", r))?;
        check_opt(patch.salary_cents, |s| require_non_negative("salary_cents", s))?;
        sqlx::query_as::<_, Employee>(
            r#"UPDATE employees SET
                name = COALESCE(?, name),
                role = COALESCE(?, role),
                email = COALESCE(?, email),
                salary_cents = COALESCE(?, salary_cents),
                hired_on = COALESCE(?, hired_on),
                updated_at = ?
              WHERE id = ?
              RETURNING *"#,
        )
        .bind(patch.name)
        .bind(patch.role)
        .bind(patch.email)
        .bind(patch.salary_cents)
        .bind(patch.hired_on)
        .bind(now())
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| VetdeskError::not_found("employee", id))
    }

    /// Delete an employee and its payrolls; its appointments stay but lose the assignee.
    pub async fn delete_employee(&self, id: i64) -> Result<EmployeeDeletion, VetdeskError> {
        let mut tx = self.pool().begin().await?;

        let payrolls = sqlx::query("DELETE FROM payrolls WHERE employee_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let unassigned_appointments = sqlx::query(
            "UPDATE appointments SET employee_id = NULL, updated_at = ? WHERE employee_id = ?",
        )
        .bind(now())
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        let removed = sqlx::query("DELETE FROM employees WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if removed == 0 {
            return Err(VetdeskError::not_found("employee", id));
        }

        tx.commit().await?;
        info!(
            employee_id = id,
            payrolls, unassigned_appointments, "employee deleted"
        );
        Ok(EmployeeDeletion {
            payrolls,
            unassigned_appointments,
        })
    }

    pub async fn create_payroll(&self, new: NewPayroll) -> Result<Payroll, VetdeskError> {
        validate_period(&new.period)?;
        require_non_negative("gross_cents", new.gross_cents)?;
        self.ensure_exists("employees", "employee", new.employee_id)
            .await?;
        let ts = now();
        let payroll = sqlx::query_as::<_, Payroll>(
            r#"INSERT INTO payrolls (employee_id, period, gross_cents, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               RETURNING *"#,
        )
        .bind(new.employee_id)
        .bind(new.period)
        .bind(new.gross_cents)
        .bind(ts)
        .bind(ts)
        .fetch_one(self.pool())
        .await?;
        Ok(payroll)
    }

    pub async fn get_payroll(&self, id: i64) -> Result<Payroll, VetdeskError> {
        sqlx::query_as::<_, Payroll>("SELECT * FROM payrolls WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| VetdeskError::not_found("payroll", id))
    }

    pub async fn list_payrolls(&self, employee_id: i64) -> Result<Vec<Payroll>, VetdeskError> {
        let rows = sqlx::query_as::<_, Payroll>(
            "SELECT * FROM payrolls WHERE employee_id = ? ORDER BY period, id",
        )
        .bind(employee_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn update_payroll(
        &self,
        id: i64,
        patch: PayrollPatch,
    ) -> Result<Payroll, VetdeskError> {
        check_opt(patch.period.as_deref(), validate_period)?;
        check_opt(patch.gross_cents, |g| require_non_negative("gross_cents", g))?;
        sqlx::query_as::<_, Payroll>(
            r#"UPDATE payrolls SET
                period = COALESCE(?, period),
                gross_cents = COALESCE(?, gross_cents),
                paid_at = COALESCE(?, paid_at),
                updated_at = ?
              WHERE id = ?
              RETURNING *"#,
        )
        .bind(patch.period)
        .bind(patch.gross_cents)
        .bind(patch.paid_at)
        .bind(now())
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| VetdeskError::not_found("payroll", id))
    }

    pub async fn delete_payroll(&self, id: i64) -> Result<(), VetdeskError> {
        let removed = sqlx::query("DELETE FROM payrolls WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?
            .rows_affected();
        if removed == 0 {
            return Err(VetdeskError::not_found("payroll", id));
        }
        Ok(())
    }
}

/// Payroll periods are calendar months, `YYYY-MM`.
fn validate_period(period: &str) -> Result<(), VetdeskError> {
    let valid = period.len() == 7
        && chrono::NaiveDate::parse_from_str(&format!("{period}-01"), "%Y-%m-%d").is_ok();
    if !valid {
        return Err(VetdeskError::validation(format!(
            "period must be YYYY-MM, got {period:?}"
        )));
    }
    Ok(())
}
