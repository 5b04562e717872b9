//! Declarative authorization: one table mapping (resource, action) to the
//! role set allowed to perform it, checked by a single `authorize` call from
//! every handler. Public operations are listed here too so the whole access
//! surface reads in one place.

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::models::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Appointments,
    AvailableSlots,
    Barbers,
    AppointmentTypes,
    Sales,
    Cash,
    Crm,
    Leads,
    Promotions,
    Users,
    Uploads,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
}

/// Roles with access, or `None` when the operation is public.
type RoleSet = Option<&'static [Role]>;

const PUBLIC: RoleSet = None;
const ADMINS: &[Role] = &[Role::Admin, Role::AdminBarber];
const STAFF: &[Role] = &[Role::Admin, Role::AdminBarber, Role::Barber, Role::Reception];
const ACCOUNT_HOLDERS: &[Role] = &[
    Role::User,
    Role::Cliente,
    Role::Admin,
    Role::Barber,
    Role::Reception,
    Role::AdminBarber,
];

pub fn required_roles(resource: Resource, action: Action) -> RoleSet {
    use Action::*;
    use Resource::*;
    match (resource, action) {
        // Guest booking and slot lookup are open booking-funnel entry points.
        (Appointments, Create) => PUBLIC,
        (AvailableSlots, _) => PUBLIC,
        (Appointments, Read) => Some(ACCOUNT_HOLDERS),
        (Appointments, Update) => Some(ADMINS),
        // Delete additionally allows the owning user; ownership is checked by
        // the handler after this role gate.
        (Appointments, Delete) => Some(ACCOUNT_HOLDERS),

        (Barbers, Read) => PUBLIC,
        (Barbers, _) => Some(ADMINS),

        (AppointmentTypes, Read) => PUBLIC,
        (AppointmentTypes, _) => Some(ADMINS),

        (Sales, _) => Some(STAFF),
        (Cash, _) => Some(ADMINS),

        // Lead capture is the public chatbot/website funnel.
        (Leads, Create) => PUBLIC,
        (Leads, _) | (Crm, _) => Some(ADMINS),

        (Promotions, Read) => PUBLIC,
        (Promotions, _) => Some(ADMINS),

        (Users, _) => Some(ADMINS),

        (Uploads, Read) => PUBLIC,
        (Uploads, _) => Some(STAFF),
    }
}

/// Admin-level callers bypass ownership checks on their own resources.
pub fn is_admin(user: &AuthUser) -> bool {
    ADMINS.contains(&user.role)
}

/// The single authorization gate. Missing identity on a protected operation
/// is 401; a known identity outside the role set is 403.
pub fn authorize(auth: Option<&AuthUser>, resource: Resource, action: Action) -> ApiResult<()> {
    match required_roles(resource, action) {
        None => Ok(()),
        Some(roles) => match auth {
            None => Err(ApiError::Unauthorized),
            Some(user) if roles.contains(&user.role) => Ok(()),
            Some(user) => Err(ApiError::Permission(format!(
                "Role {:?} is not allowed to perform this operation",
                user.role
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth(role: Role) -> AuthUser {
        AuthUser {
            id: "u1".into(),
            email: "u1@test.com".into(),
            name: "U One".into(),
            role,
        }
    }

    #[test]
    fn guest_booking_and_lead_capture_are_public() {
        assert!(authorize(None, Resource::Appointments, Action::Create).is_ok());
        assert!(authorize(None, Resource::Leads, Action::Create).is_ok());
        assert!(authorize(None, Resource::AvailableSlots, Action::Read).is_ok());
    }

    #[test]
    fn every_resource_action_pair_has_a_rule() {
        let resources = [
            Resource::Appointments,
            Resource::AvailableSlots,
            Resource::Barbers,
            Resource::AppointmentTypes,
            Resource::Sales,
            Resource::Cash,
            Resource::Crm,
            Resource::Leads,
            Resource::Promotions,
            Resource::Users,
            Resource::Uploads,
        ];
        let actions = [Action::Read, Action::Create, Action::Update, Action::Delete];
        for resource in resources {
            for action in actions {
                // Admins clear every non-public gate.
                assert!(authorize(Some(&auth(Role::Admin)), resource, action).is_ok());
            }
        }
    }

    #[test]
    fn cash_register_is_admin_only() {
        assert!(matches!(
            authorize(None, Resource::Cash, Action::Read),
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(
            authorize(Some(&auth(Role::Barber)), Resource::Cash, Action::Read),
            Err(ApiError::Permission(_))
        ));
        assert!(authorize(Some(&auth(Role::Admin)), Resource::Cash, Action::Create).is_ok());
        assert!(authorize(Some(&auth(Role::AdminBarber)), Resource::Cash, Action::Read).is_ok());
    }

    #[test]
    fn pos_is_open_to_staff_not_clients() {
        assert!(authorize(Some(&auth(Role::Reception)), Resource::Sales, Action::Create).is_ok());
        assert!(authorize(Some(&auth(Role::Barber)), Resource::Sales, Action::Create).is_ok());
        assert!(matches!(
            authorize(Some(&auth(Role::Cliente)), Resource::Sales, Action::Create),
            Err(ApiError::Permission(_))
        ));
    }

    #[test]
    fn user_management_requires_admin() {
        assert!(matches!(
            authorize(Some(&auth(Role::Reception)), Resource::Users, Action::Delete),
            Err(ApiError::Permission(_))
        ));
        assert!(authorize(Some(&auth(Role::Admin)), Resource::Users, Action::Delete).is_ok());
    }
}
