//! Macros for ergonomic event declaration.

/// Declare event types and implement [`Event`](crate::core::Event) for them.
///
/// Accepts any number of unit and braced structs. Each one derives `Clone`
/// and `Debug`, so payload fields must implement both.
///
/// # Example
///
/// ```
/// use nestmachine::core::{EventKind, EventRef};
/// use nestmachine::events;
///
/// events! {
///     /// The countdown reached zero.
///     pub struct Liftoff;
///
///     pub struct Telemetry {
///         pub altitude: u32,
///         pub stage: u8,
///     }
/// }
///
/// let event = EventRef::new(Telemetry { altitude: 1200, stage: 1 });
/// assert_eq!(event.kind(), EventKind::of::<Telemetry>());
/// assert_eq!(EventKind::of::<Liftoff>().name(), "Liftoff");
/// ```
#[macro_export]
macro_rules! events {
    () => {};

    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident;
        $($rest:tt)*
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug)]
        $vis struct $name;

        impl $crate::core::Event for $name {}

        $crate::events! { $($rest)* }
    };

    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $ty:ty
            ),* $(,)?
        }
        $($rest:tt)*
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug)]
        $vis struct $name {
            $(
                $(#[$field_meta])*
                $field_vis $field: $ty
            ),*
        }

        impl $crate::core::Event for $name {}

        $crate::events! { $($rest)* }
    };
}
