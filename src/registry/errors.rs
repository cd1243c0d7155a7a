use caesar::request::ObjectId;

quick_error! {
    #[derive(Debug, Eq, PartialEq)]
    pub enum RegistryError {
        /// No object is registered with this id.
        NotFound(oid: ObjectId) {
            display("object not found: {}", oid)
        }

        Duplicated(oid: ObjectId) {
            display("object already registered: {}", oid)
        }
    }
}
