//! `define_port_error!`: error enums for the driven ports.
//!
//! Every port failure carries a free-form `message` from the adapter, so a
//! variant is declared by name and display prefix only:
//!
//! ```ignore
//! define_port_error! {
//!     pub enum StoreError {
//!         Query => "sync store query failed",
//!     }
//! }
//! // StoreError::Query { message } displays as "sync store query failed: {message}"
//! // and is built with StoreError::query("...").
//! ```

macro_rules! define_port_error {
    (
        $(#[$outer:meta])*
        pub enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident => $prefix:literal
            ),* $(,)?
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
        pub enum $name {
            $(
                $(#[$variant_meta])*
                #[error("{}: {message}", $prefix)]
                $variant { message: String },
            )*
        }

        impl $name {
            $(
                ::paste::paste! {
                    pub fn [<$variant:snake>](message: impl Into<String>) -> Self {
                        Self::$variant { message: message.into() }
                    }
                }
            )*
        }
    };
}

pub(crate) use define_port_error;

#[cfg(test)]
mod tests {
    use rstest::rstest;

    define_port_error! {
        pub enum ProbeError {
            Offline => "probe offline",
            RateLimited => "probe throttled",
        }
    }

    #[rstest]
    #[case(ProbeError::offline("dns failure"), "probe offline: dns failure")]
    #[case(ProbeError::rate_limited(String::from("429")), "probe throttled: 429")]
    fn constructors_prefix_the_message(#[case] err: ProbeError, #[case] expected: &str) {
        assert_eq!(err.to_string(), expected);
    }

    #[rstest]
    fn constructors_build_the_named_variant() {
        assert_eq!(
            ProbeError::rate_limited("slow down"),
            ProbeError::RateLimited {
                message: "slow down".to_owned()
            }
        );
    }
}
