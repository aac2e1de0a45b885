//! Subset of the `packages` table found in `primary.sqlite` repository indexes.

diesel::table! {
    packages (pkg_key) {
        #[sql_name = "pkgKey"]
        pkg_key -> Integer,
        #[sql_name = "pkgId"]
        pkg_id -> Nullable<Text>,
        name -> Nullable<Text>,
        arch -> Nullable<Text>,
        version -> Nullable<Text>,
        epoch -> Nullable<Text>,
        release -> Nullable<Text>,
        location_href -> Nullable<Text>,
        rpm_sourcerpm -> Nullable<Text>,
        checksum_type -> Nullable<Text>,
    }
}
