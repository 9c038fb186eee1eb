pub mod bookingmodel;
pub mod chatmodels;
pub mod storemodels;
pub mod usermodel;
